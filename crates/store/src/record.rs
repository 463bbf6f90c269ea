use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version number for a stored row, used for optimistic concurrency control.
///
/// A row that has never been written is at version 0. The first write
/// creates it at version 1 and every later write increments by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a row that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1), assigned on insert.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if this is the version of a row that was never written.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored row: one entity serialized as JSON with its version.
///
/// `kind` names the table-like collection the row belongs to
/// (e.g. `"offer"`, `"booking"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// The collection this row belongs to.
    pub kind: String,

    /// Primary key within the collection.
    pub id: Uuid,

    /// On read: the committed version. On write: the version the writer read,
    /// which the store checks before applying the change.
    pub version: Version,

    /// The entity as JSON.
    pub data: serde_json::Value,

    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Creates a record from a serializable value.
    pub fn new<T: Serialize>(
        kind: impl Into<String>,
        id: Uuid,
        version: Version,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.into(),
            id,
            version,
            data: serde_json::to_value(value)?,
            updated_at: Utc::now(),
        })
    }

    /// Returns true if the top-level JSON field equals `value`.
    pub fn field_equals(&self, field: &str, value: &serde_json::Value) -> bool {
        self.data.get(field) == Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::initial() < Version::first());
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::initial().is_initial());
        assert!(!Version::first().is_initial());
    }

    #[test]
    fn record_field_equals() {
        let record = Record::new(
            "offer",
            Uuid::new_v4(),
            Version::initial(),
            &serde_json::json!({ "status": "Pending", "price": "10.00" }),
        )
        .unwrap();

        assert!(record.field_equals("status", &serde_json::json!("Pending")));
        assert!(!record.field_equals("status", &serde_json::json!("Accepted")));
        assert!(!record.field_equals("missing", &serde_json::json!("Pending")));
    }
}
