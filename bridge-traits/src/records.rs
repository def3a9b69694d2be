//! Cloud Record Store Abstraction
//!
//! Key-value records kept in a container's private cloud database
//! (`CKContainer.privateCloudDatabase` on Apple platforms).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Record type used for key-value storage items
pub const STORAGE_ITEM_RECORD_TYPE: &str = "StorageItem";

/// A record with string-keyed JSON fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudRecord {
    pub record_type: String,
    pub fields: Map<String, Value>,
}

impl CloudRecord {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Private cloud database of a container
///
/// # Example
///
/// ```ignore
/// use bridge_traits::records::{CloudRecord, CloudRecordStore};
///
/// async fn remember(store: &dyn CloudRecordStore) -> Result<()> {
///     let record = CloudRecord::new("StorageItem").with_value("theme", "dark".into());
///     store.save_record("iCloud.com.example.app", record).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CloudRecordStore: Send + Sync {
    /// Fetch every record of `record_type` in the container
    async fn query_records(&self, container_id: &str, record_type: &str)
        -> Result<Vec<CloudRecord>>;

    /// Save a new record and return it as stored
    async fn save_record(&self, container_id: &str, record: CloudRecord) -> Result<CloudRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = CloudRecord::new(STORAGE_ITEM_RECORD_TYPE)
            .with_value("greeting", Value::from("hello"))
            .with_value("count", Value::from(3));

        assert_eq!(record.record_type, "StorageItem");
        assert_eq!(record.value("greeting"), Some(&Value::from("hello")));
        assert_eq!(record.value("count"), Some(&Value::from(3)));
        assert_eq!(record.value("missing"), None);
    }
}
