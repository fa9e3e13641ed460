use std::collections::BTreeMap;
use std::sync::Arc;

use crate::constants::APPL_DB;
use crate::constants::CONFIG_DB;
use crate::constants::COUNTERS_DB;
use crate::constants::COUNTERS_PORT_NAME_MAP;
use crate::constants::COUNTERS_QUEUE_NAME_MAP;
use crate::DataStore;
use crate::DatabaseCatalog;
use crate::FieldMap;
use crate::MemoryStore;
use crate::PathResolver;
use crate::StoreConfig;
use crate::StoreWriter;
use crate::ValueReader;
use crate::VersionInfo;

pub const ETHERNET0_OID: &str = "oid:0x1000000000002";
pub const ETHERNET4_OID: &str = "oid:0x1000000000003";
pub const QUEUE0_OID: &str = "oid:0x15000000000101";
pub const TEST_BUILD_VERSION: &str = "sonic.test.20261014";

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// In-memory store holding a small SONiC-like data set
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(1024));
    seed(store.as_ref()).await;
    store
}

pub async fn seed(writer: &dyn StoreWriter) {
    let rows: Vec<(&str, &str, FieldMap)> = vec![
        (
            COUNTERS_DB,
            COUNTERS_PORT_NAME_MAP,
            fields(&[("Ethernet0", ETHERNET0_OID), ("Ethernet4", ETHERNET4_OID)]),
        ),
        (COUNTERS_DB, COUNTERS_QUEUE_NAME_MAP, fields(&[("Ethernet0:0", QUEUE0_OID)])),
        (
            COUNTERS_DB,
            "COUNTERS:oid:0x1000000000002",
            fields(&[("SAI_PORT_STAT_IF_IN_ERRORS", "0"), ("SAI_PORT_STAT_IF_IN_OCTETS", "1000")]),
        ),
        (
            COUNTERS_DB,
            "COUNTERS:oid:0x1000000000003",
            fields(&[("SAI_PORT_STAT_IF_IN_ERRORS", "5"), ("SAI_PORT_STAT_IF_IN_OCTETS", "2000")]),
        ),
        (
            COUNTERS_DB,
            "COUNTERS:oid:0x15000000000101",
            fields(&[("SAI_QUEUE_STAT_PACKETS", "12")]),
        ),
        (
            APPL_DB,
            "PORT_TABLE:Ethernet0",
            fields(&[("oper_status", "up"), ("mtu", "9100")]),
        ),
        (
            APPL_DB,
            "PORT_TABLE:Ethernet4",
            fields(&[("oper_status", "down"), ("mtu", "9100")]),
        ),
        (CONFIG_DB, "FEATURE|telemetry", fields(&[("status", "enabled")])),
        (
            CONFIG_DB,
            "TELEMETRY|gnmi",
            fields(&[("port", "50051"), ("client_auth", "false")]),
        ),
    ];
    for (db, key, fields) in rows {
        writer.set_entry(db, key, fields).await.unwrap();
    }
}

pub fn test_catalog() -> Arc<DatabaseCatalog> {
    Arc::new(DatabaseCatalog::from_config(&StoreConfig::default().databases))
}

pub fn test_version() -> Arc<VersionInfo> {
    let mut fields = BTreeMap::new();
    fields.insert("build_version".to_string(), TEST_BUILD_VERSION.to_string());
    Arc::new(VersionInfo::from_fields(fields))
}

pub fn test_resolver(store: Arc<dyn DataStore>) -> PathResolver {
    PathResolver::new(test_catalog(), store, super::fast_retry())
}

pub fn test_reader(store: Arc<dyn DataStore>) -> ValueReader {
    ValueReader::new(store, test_version(), super::fast_retry())
}
