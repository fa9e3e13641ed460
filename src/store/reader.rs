use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use super::read_with_retry;
use super::DataStore;
use super::FieldMap;
use super::StoreResult;
use super::VersionInfo;
use crate::constants::BUILD_VERSION_FIELD;
use crate::BackoffPolicy;
use crate::DataSource;
use crate::VirtualPath;

/// Value read for one resolved path
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    /// Tables, entries and virtual paths
    Json(Value),
    /// A single field
    String(String),
}

impl TelemetryValue {
    /// Pretty-printed JSON body, as carried in `json_ietf_val`
    pub fn to_json_bytes(&self) -> StoreResult<Vec<u8>> {
        let bytes = match self {
            TelemetryValue::Json(value) => serde_json::to_vec_pretty(value)?,
            TelemetryValue::String(s) => serde_json::to_vec_pretty(s)?,
        };
        Ok(bytes)
    }
}

fn fields_to_json(fields: FieldMap) -> Value {
    Value::Object(fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

/// Reads values of resolved paths from the shared store.
///
/// `Ok(None)` means the data behind the path no longer exists.
#[derive(Clone)]
pub struct ValueReader {
    store: Arc<dyn DataStore>,
    version: Arc<VersionInfo>,
    retry: BackoffPolicy,
}

impl ValueReader {
    pub fn new(
        store: Arc<dyn DataStore>,
        version: Arc<VersionInfo>,
        retry: BackoffPolicy,
    ) -> Self {
        Self { store, version, retry }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub async fn read(
        &self,
        source: &DataSource,
    ) -> StoreResult<Option<TelemetryValue>> {
        match source {
            DataSource::Table { db, prefix, .. } => {
                let entries = read_with_retry(db, || self.store.scan_prefix(db, prefix), self.retry).await?;
                if entries.is_empty() {
                    return Ok(None);
                }
                let table: Map<String, Value> = entries
                    .into_iter()
                    .map(|(key, fields)| {
                        let short = key.strip_prefix(prefix.as_str()).unwrap_or(&key).to_string();
                        (short, fields_to_json(fields))
                    })
                    .collect();
                Ok(Some(TelemetryValue::Json(Value::Object(table))))
            }
            DataSource::Entry { db, key } => {
                let entry = read_with_retry(db, || self.store.get_entry(db, key), self.retry).await?;
                Ok(entry.map(|fields| TelemetryValue::Json(fields_to_json(fields))))
            }
            DataSource::Field { db, key, field } => {
                let value = read_with_retry(db, || self.store.get_field(db, key, field), self.retry).await?;
                Ok(value.map(TelemetryValue::String))
            }
            DataSource::Virtual(VirtualPath::OsVersionBuild) => {
                let mut body = Map::new();
                body.insert(
                    BUILD_VERSION_FIELD.to_string(),
                    Value::String(self.version.build_version().to_string()),
                );
                Ok(Some(TelemetryValue::Json(Value::Object(body))))
            }
        }
    }
}
