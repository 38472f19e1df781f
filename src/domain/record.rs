use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identifier of a disjoint key-space segment of a table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(String);

impl From<String> for PartitionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PartitionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The fields needed to address a single record for deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
}

impl EntityKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

/// A record as returned by a scan.
///
/// Only `partition_key` is always present; the row key, timestamp and payload
/// are absent when a projection leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey", default, skip_serializing_if = "Option::is_none")]
    pub row_key: Option<String>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: Some(row_key.into()),
            timestamp: Some(timestamp),
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Returns the identifying key, or `None` if the row key was not projected.
    pub fn into_key(self) -> Option<EntityKey> {
        let row_key = self.row_key?;
        Some(EntityKey {
            partition_key: self.partition_key,
            row_key,
        })
    }
}

/// Checks a partition or row key value against the characters the store refuses.
pub fn validate_key_value(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Invalid key: key cannot be empty.".to_string());
    }

    // the store caps key properties at 1 KiB
    if value.len() > 1024 {
        return Err("Invalid key: cannot be longer than 1024 bytes.".to_string());
    }

    let forbidden = ['/', '\\', '#', '?'];
    if let Some(c) = value
        .chars()
        .find(|c| forbidden.contains(c) || c.is_control())
    {
        return Err(format!("Invalid key: '{value}' contains forbidden character {c:?}."));
    }

    Ok(())
}
