//! Record lifecycle building blocks
//!
//! Entities compose these field groups explicitly instead of inheriting them:
//! - [`Timestamps`] for creation/update times
//! - [`StatusFields`] plus the [`StatusTrackable`] capability for processing state
//! - [`SoftDeleteFields`] for soft deletion
//! - [`Metadata`] for the free-form JSON bag
//! - [`Principal`] access checks for shared resources

mod access;
mod status;

pub use access::*;
pub use status::*;

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// Current time as a fixed-width RFC 3339 string (sorts lexicographically)
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Fresh random record identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Creation and last-update times
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: String,
    pub updated_at: String,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = now_timestamp();
        Self {
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Soft-delete flag and time
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SoftDeleteFields {
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

/// Free-form JSON object attached to a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored `metadata_json` column; anything but an object is treated as empty
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a value by key, falling back to `default` when absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.0.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge every key of `data` into the bag, overwriting existing keys
    pub fn update(&mut self, data: Map<String, Value>) {
        self.0.extend(data);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_get_set_update() {
        let mut meta = Metadata::new();
        meta.set("source", "upload");
        assert_eq!(meta.get("source"), Some(&json!("upload")));
        assert_eq!(meta.get_or("missing", &json!(7)), &json!(7));

        let mut extra = Map::new();
        extra.insert("source".to_string(), json!("upload"));
        extra.insert("pages".to_string(), json!(3));
        meta.update(extra);

        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get("source"), Some(&json!("upload")));
    }

    #[test]
    fn test_metadata_json_roundtrip_and_garbage() {
        let mut meta = Metadata::new();
        meta.set("k", json!([1, 2]));
        let stored = meta.to_json().unwrap();
        assert_eq!(Metadata::from_json(&stored), meta);

        assert!(Metadata::from_json("[1,2,3]").is_empty());
        assert!(Metadata::from_json("not json").is_empty());
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let first = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = now_timestamp();
        assert!(first < second);
        assert_eq!(first.len(), second.len());
    }
}
