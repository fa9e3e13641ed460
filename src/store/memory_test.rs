use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::test_utils::fields;
use crate::test_utils::seeded_store;

#[tokio::test]
async fn test_set_and_get_entry() {
    let store = MemoryStore::new(16);
    store
        .set_entry("APPL_DB", "PORT_TABLE:Ethernet0", fields(&[("mtu", "9100")]))
        .await
        .unwrap();

    let entry = store.get_entry("APPL_DB", "PORT_TABLE:Ethernet0").await.unwrap();
    assert_eq!(entry, Some(fields(&[("mtu", "9100")])));
    assert_eq!(store.get_field("APPL_DB", "PORT_TABLE:Ethernet0", "mtu").await.unwrap().as_deref(), Some("9100"));
    assert_eq!(store.get_field("APPL_DB", "PORT_TABLE:Ethernet0", "speed").await.unwrap(), None);
    assert_eq!(store.get_entry("STATE_DB", "PORT_TABLE:Ethernet0").await.unwrap(), None);
}

#[tokio::test]
async fn test_databases_are_isolated() {
    let store = MemoryStore::new(16);
    store.set_field("APPL_DB", "K", "f", "appl").await.unwrap();
    store.set_field("STATE_DB", "K", "f", "state").await.unwrap();

    assert_eq!(store.get_field("APPL_DB", "K", "f").await.unwrap().as_deref(), Some("appl"));
    assert_eq!(store.get_field("STATE_DB", "K", "f").await.unwrap().as_deref(), Some("state"));
    assert_eq!(store.len("APPL_DB"), 1);
    assert_eq!(store.len("CONFIG_DB"), 0);
}

#[tokio::test]
async fn test_scan_prefix_is_ordered_and_bounded() {
    let store = seeded_store().await;

    let entries = store.scan_prefix("COUNTERS_DB", "COUNTERS:").await.unwrap();
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "COUNTERS:oid:0x1000000000002",
            "COUNTERS:oid:0x1000000000003",
            "COUNTERS:oid:0x15000000000101",
        ]
    );
    // the name map keys share the table name but not the separator
    assert!(!keys.iter().any(|k| k.starts_with("COUNTERS_")));
}

#[tokio::test]
async fn test_writes_publish_changes() {
    let store = MemoryStore::new(16);
    let mut rx = store.changes();

    store.set_field("CONFIG_DB", "TELEMETRY|gnmi", "port", "50051").await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), KeyChange::set("CONFIG_DB", "TELEMETRY|gnmi"));

    assert!(store.delete_entry("CONFIG_DB", "TELEMETRY|gnmi").await.unwrap());
    assert_eq!(rx.try_recv().unwrap(), KeyChange::delete("CONFIG_DB", "TELEMETRY|gnmi"));

    // deleting a missing key publishes nothing
    assert!(!store.delete_entry("CONFIG_DB", "TELEMETRY|gnmi").await.unwrap());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_during_writes() {
    let store = Arc::new(MemoryStore::new(4096));
    store.set_field("COUNTERS_DB", "COUNTERS:oid:1", "v", "0").await.unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 1..=500 {
                store.set_field("COUNTERS_DB", "COUNTERS:oid:1", "v", &i.to_string()).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            let mut last = 0u32;
            for _ in 0..500 {
                let v: u32 = store
                    .get_field("COUNTERS_DB", "COUNTERS:oid:1", "v")
                    .await
                    .unwrap()
                    .unwrap()
                    .parse()
                    .unwrap();
                // a reader never observes values going backwards
                assert!(v >= last);
                last = v;
            }
        }));
    }

    writer.await.unwrap();
    for r in readers {
        r.await.unwrap();
    }
    assert_eq!(store.get_field("COUNTERS_DB", "COUNTERS:oid:1", "v").await.unwrap().as_deref(), Some("500"));
}

#[tokio::test]
async fn test_sled_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry");
    {
        let store = SledStore::open(&path, 16).unwrap();
        let mut rx = store.changes();
        store
            .set_entry("COUNTERS_DB", "COUNTERS:oid:1", fields(&[("a", "1")]))
            .await
            .unwrap();
        store.set_field("COUNTERS_DB", "COUNTERS:oid:1", "b", "2").await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), KeyChange::set("COUNTERS_DB", "COUNTERS:oid:1"));
        store.flush().unwrap();
    }

    let store = SledStore::open(&path, 16).unwrap();
    assert_eq!(
        store.get_entry("COUNTERS_DB", "COUNTERS:oid:1").await.unwrap(),
        Some(fields(&[("a", "1"), ("b", "2")]))
    );
    assert_eq!(store.scan_prefix("COUNTERS_DB", "COUNTERS:").await.unwrap().len(), 1);
    assert!(store.delete_entry("COUNTERS_DB", "COUNTERS:oid:1").await.unwrap());
    assert_eq!(store.get_entry("COUNTERS_DB", "COUNTERS:oid:1").await.unwrap(), None);
}

#[tokio::test]
async fn test_open_store_applies_seed_file() {
    let dir = tempfile::tempdir().unwrap();
    let seed_path = dir.path().join("seed.json");
    std::fs::write(
        &seed_path,
        r#"{ "COUNTERS_DB": { "COUNTERS_PORT_NAME_MAP": { "Ethernet0": "oid:0x1" },
                             "COUNTERS:oid:0x1": { "SAI_PORT_STAT_IF_IN_ERRORS": "3" } } }"#,
    )
    .unwrap();

    let config = crate::StoreConfig {
        seed_file: Some(seed_path),
        ..Default::default()
    };
    let handle = open_store(&config).await.unwrap();

    assert_eq!(
        handle
            .reader
            .get_field("COUNTERS_DB", "COUNTERS:oid:0x1", "SAI_PORT_STAT_IF_IN_ERRORS")
            .await
            .unwrap()
            .as_deref(),
        Some("3")
    );
}

#[tokio::test]
async fn test_open_store_rejects_malformed_seed_file() {
    let dir = tempfile::tempdir().unwrap();
    let seed_path = dir.path().join("seed.json");
    std::fs::write(&seed_path, "{ not json").unwrap();

    let config = crate::StoreConfig {
        seed_file: Some(seed_path),
        ..Default::default()
    };
    assert!(matches!(open_store(&config).await, Err(StoreError::Json(_))));
}
