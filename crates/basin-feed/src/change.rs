// ── Change-feed record types ──
//
// TableName and ChangeKind identify a feed pair; ChangeRecord is what a
// persistent record store delivers for one changed row.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ── ChangeKind ──────────────────────────────────────────────────────

/// The kind of row change a record store reports.
///
/// A closed enumeration rather than free-form strings: a listener
/// declared for a kind that does not exist fails to compile instead of
/// silently never firing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A new row was stored.
    Created,
    /// An existing row's fields changed.
    Updated,
    /// A row was deleted.
    Deleted,
}

// ── TableName ───────────────────────────────────────────────────────

/// Name of a table in the backing record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TableName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── ChangeRecord ────────────────────────────────────────────────────

/// One delivered change from the record store.
///
/// `row` is the raw stored row (for `Deleted` it carries at least the
/// row's id). `seq` is assigned by the delivering feed and increases
/// monotonically per feed instance, so consumers can observe per-pair
/// FIFO ordering. Delivery is at-least-once; a redelivered record keeps
/// its original row data but may carry a new `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub table: TableName,
    pub kind: ChangeKind,
    pub seq: u64,
    pub row: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn change_kind_displays_lowercase() {
        assert_eq!(ChangeKind::Created.to_string(), "created");
        assert_eq!(ChangeKind::Updated.to_string(), "updated");
        assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
    }

    #[test]
    fn change_kind_parses_from_str() {
        assert_eq!(ChangeKind::from_str("created").unwrap(), ChangeKind::Created);
        assert_eq!(ChangeKind::from_str("deleted").unwrap(), ChangeKind::Deleted);
        assert!(ChangeKind::from_str("upserted").is_err());
    }

    #[test]
    fn change_kind_iterates_all_variants() {
        let kinds: Vec<ChangeKind> = ChangeKind::iter().collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
        );
    }

    #[test]
    fn table_name_from_str_and_display() {
        let table = TableName::from("channelset");
        assert_eq!(table.as_str(), "channelset");
        assert_eq!(table.to_string(), "channelset");
    }

    #[test]
    fn change_record_deserializes() {
        let json = r#"{
            "table": "channelset",
            "kind": "updated",
            "seq": 7,
            "row": { "id": "abc", "name": "Science" }
        }"#;

        let record: ChangeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.table.as_str(), "channelset");
        assert_eq!(record.kind, ChangeKind::Updated);
        assert_eq!(record.seq, 7);
        assert_eq!(record.row["name"], "Science");
    }
}
