use std::collections::BTreeMap;
use std::path::Path;

use super::FieldMap;
use super::StoreResult;
use super::StoreWriter;

/// `{ "<DB>": { "<key>": { "<field>": "<value>" } } }`
pub type SeedDocument = BTreeMap<String, BTreeMap<String, FieldMap>>;

/// Loads a JSON seed document into the store, returns the number of keys written
pub async fn load_seed_file(
    path: &Path,
    writer: &dyn StoreWriter,
) -> StoreResult<usize> {
    let raw = tokio::fs::read(path).await?;
    let document: SeedDocument = serde_json::from_slice(&raw)?;
    apply_seed(document, writer).await
}

pub async fn apply_seed(
    document: SeedDocument,
    writer: &dyn StoreWriter,
) -> StoreResult<usize> {
    let mut written = 0;
    for (db, entries) in document {
        for (key, fields) in entries {
            writer.set_entry(&db, &key, fields).await?;
            written += 1;
        }
    }
    Ok(written)
}
