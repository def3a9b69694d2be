//! Key-value store over [`CloudRecordStore`]

use crate::error::{KvError, Result};
use bridge_traits::records::{CloudRecord, CloudRecordStore, STORAGE_ITEM_RECORD_TYPE};
use core_runtime::config::CoreConfig;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct KvStore {
    records: Arc<dyn CloudRecordStore>,
    record_type: String,
}

impl KvStore {
    pub fn new(records: Arc<dyn CloudRecordStore>) -> Self {
        Self {
            records,
            record_type: STORAGE_ITEM_RECORD_TYPE.to_string(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(Arc::clone(&config.record_store)).with_record_type(config.record_type.clone())
    }

    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Every string value stored under `key`.
    ///
    /// Records without `key`, or holding a non-string value, are skipped.
    pub async fn fetch_strings(&self, container_id: &str, key: &str) -> Result<Vec<String>> {
        let records = self
            .records
            .query_records(container_id, &self.record_type)
            .await?;

        let values: Vec<String> = records
            .iter()
            .filter_map(|record| record.value(key))
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();

        debug!(
            records = records.len(),
            matches = values.len(),
            "Fetched key-value records"
        );
        Ok(values)
    }

    /// Save `value` under `key` as a new record
    pub async fn save_value(&self, container_id: &str, key: &str, value: Value) -> Result<CloudRecord> {
        if key.is_empty() {
            return Err(KvError::InvalidKey("key must not be empty".to_string()));
        }

        let record = CloudRecord::new(self.record_type.clone()).with_value(key, value);
        Ok(self.records.save_record(container_id, record).await?)
    }

    /// `None` when the record query fails
    #[instrument(skip(self), fields(record_type = %self.record_type))]
    pub async fn get_string(&self, container_id: &str, key: &str) -> Option<Vec<String>> {
        match self.fetch_strings(container_id, key).await {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(error = %e, "Key-value query failed");
                None
            }
        }
    }

    /// `true` once the record is saved
    #[instrument(skip(self, value), fields(record_type = %self.record_type))]
    pub async fn put_string(&self, container_id: &str, key: &str, value: Value) -> bool {
        match self.save_value(container_id, key, value).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Key-value save failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::BridgeError;
    use mockall::mock;
    use mockall::predicate::eq;
    use serde_json::json;

    mock! {
        RecordStore {}

        #[async_trait]
        impl CloudRecordStore for RecordStore {
            async fn query_records(&self, container_id: &str, record_type: &str) -> BridgeResult<Vec<CloudRecord>>;
            async fn save_record(&self, container_id: &str, record: CloudRecord) -> BridgeResult<CloudRecord>;
        }
    }

    const CONTAINER: &str = "iCloud.com.example.app";

    #[tokio::test]
    async fn test_get_string_keeps_only_string_values() {
        let mut records = MockRecordStore::new();
        records
            .expect_query_records()
            .with(eq(CONTAINER), eq(STORAGE_ITEM_RECORD_TYPE))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    CloudRecord::new(STORAGE_ITEM_RECORD_TYPE).with_value("theme", json!("dark")),
                    CloudRecord::new(STORAGE_ITEM_RECORD_TYPE).with_value("theme", json!(3)),
                    CloudRecord::new(STORAGE_ITEM_RECORD_TYPE).with_value("other", json!("x")),
                    CloudRecord::new(STORAGE_ITEM_RECORD_TYPE).with_value("theme", json!("light")),
                ])
            });

        let store = KvStore::new(Arc::new(records));
        let values = store.get_string(CONTAINER, "theme").await;

        assert_eq!(values, Some(vec!["dark".to_string(), "light".to_string()]));
    }

    #[tokio::test]
    async fn test_get_string_is_none_when_query_fails() {
        let mut records = MockRecordStore::new();
        records
            .expect_query_records()
            .returning(|_, _| Err(BridgeError::NotAvailable("signed out".to_string())));

        let store = KvStore::new(Arc::new(records));
        assert_eq!(store.get_string(CONTAINER, "theme").await, None);
    }

    #[tokio::test]
    async fn test_put_string_saves_storage_item() {
        let mut records = MockRecordStore::new();
        records
            .expect_save_record()
            .withf(|container_id, record| {
                container_id == CONTAINER
                    && record.record_type == STORAGE_ITEM_RECORD_TYPE
                    && record.value("theme") == Some(&json!("dark"))
            })
            .times(1)
            .returning(|_, record| Ok(record));

        let store = KvStore::new(Arc::new(records));
        assert!(store.put_string(CONTAINER, "theme", json!("dark")).await);
    }

    #[tokio::test]
    async fn test_put_string_reports_failure() {
        let mut records = MockRecordStore::new();
        records
            .expect_save_record()
            .returning(|_, _| Err(BridgeError::OperationFailed("quota".to_string())));

        let store = KvStore::new(Arc::new(records));
        assert!(!store.put_string(CONTAINER, "theme", json!("dark")).await);
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_without_saving() {
        let mut records = MockRecordStore::new();
        records.expect_save_record().never();

        let store = KvStore::new(Arc::new(records));
        let result = store.save_value(CONTAINER, "", json!("dark")).await;

        assert!(matches!(result, Err(KvError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_custom_record_type() {
        let mut records = MockRecordStore::new();
        records
            .expect_query_records()
            .with(eq(CONTAINER), eq("Preference"))
            .returning(|_, _| Ok(vec![]));

        let store = KvStore::new(Arc::new(records)).with_record_type("Preference");
        assert_eq!(store.record_type(), "Preference");
        assert_eq!(store.get_string(CONTAINER, "theme").await, Some(vec![]));
    }
}
