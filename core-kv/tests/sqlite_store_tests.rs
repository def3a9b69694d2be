//! Key-value round trips through the desktop SQLite record store

use bridge_desktop::SqliteRecordStore;
use core_kv::KvStore;
use serde_json::json;
use std::sync::Arc;

async fn store() -> KvStore {
    KvStore::new(Arc::new(SqliteRecordStore::in_memory().await.unwrap()))
}

#[tokio::test]
async fn test_every_saved_string_is_returned() {
    let kv = store().await;

    assert!(kv.put_string("iCloud.a", "theme", json!("dark")).await);
    assert!(kv.put_string("iCloud.a", "theme", json!("light")).await);
    assert!(kv.put_string("iCloud.a", "volume", json!(7)).await);

    let values = kv.get_string("iCloud.a", "theme").await.unwrap();
    assert_eq!(values, vec!["dark".to_string(), "light".to_string()]);
    assert_eq!(kv.get_string("iCloud.a", "volume").await, Some(vec![]));
}

#[tokio::test]
async fn test_containers_are_isolated() {
    let kv = store().await;

    assert!(kv.put_string("iCloud.a", "theme", json!("dark")).await);

    assert_eq!(kv.get_string("iCloud.b", "theme").await, Some(vec![]));
}
