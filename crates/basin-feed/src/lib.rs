// basin-feed: change-feed boundary for the basin store (record types + in-process feeds).

pub mod change;
pub mod channel;
pub mod error;
pub mod feed;
pub mod memory;

pub use change::{ChangeKind, ChangeRecord, TableName};
pub use channel::{ChangeSender, ChannelFeed, ChannelFeedConfig};
pub use error::FeedError;
pub use feed::{ChangeFeed, ChangeHandler};
pub use memory::MemoryFeed;
