//! Path/Query Resolver
//!
//! Turns a target name plus an xpath (or gNMI path elements) into a
//! [`ResolvedPath`]: the canonical descriptor naming exactly one data source.
//! Resolution runs before any session exists, so every failure here
//! short-circuits the RPC.

mod xpath;
pub use xpath::*;


use std::sync::Arc;

use tracing::debug;

use crate::constants::COUNTERS_TABLE;
use crate::constants::OSVERSION_BUILD;
use crate::constants::OTHERS_TARGET;
use crate::store::read_with_retry;
use crate::BackoffPolicy;
use crate::DataStore;
use crate::DatabaseCatalog;
use crate::DatabaseSpec;
use crate::KeyChange;
use crate::ResolveError;
use crate::Result;
use crate::TargetDefinedPolicy;

/// Paths served by virtual targets, outside any database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPath {
    /// `OTHERS` / `osversion/build`
    OsVersionBuild,
}

/// Where the value of a resolved path is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Every entry of `table`, keys start with `prefix`
    Table { db: String, table: String, prefix: String },
    /// All fields of one key
    Entry { db: String, key: String },
    /// A single field of one key
    Field { db: String, key: String, field: String },
    Virtual(VirtualPath),
}

impl DataSource {
    pub fn db(&self) -> Option<&str> {
        match self {
            DataSource::Table { db, .. } | DataSource::Entry { db, .. } | DataSource::Field { db, .. } => Some(db),
            DataSource::Virtual(_) => None,
        }
    }

    /// Whether a write to `change.key` can alter the value of this source
    pub fn is_affected_by(
        &self,
        change: &KeyChange,
    ) -> bool {
        match self {
            DataSource::Table { db, prefix, .. } => *db == change.db && change.key.starts_with(prefix.as_str()),
            DataSource::Entry { db, key } | DataSource::Field { db, key, .. } => *db == change.db && *key == change.key,
            DataSource::Virtual(_) => false,
        }
    }
}

/// Canonical descriptor of one requested path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub target: String,
    /// Element names as requested, echoed back in every update
    pub elems: Vec<String>,
    pub source: DataSource,
    /// Behaviour of a TARGET_DEFINED subscription on this path
    pub policy: TargetDefinedPolicy,
}

impl ResolvedPath {
    pub fn xpath(&self) -> String {
        self.elems.join("/")
    }
}

#[derive(Clone)]
pub struct PathResolver {
    catalog: Arc<DatabaseCatalog>,
    store: Arc<dyn DataStore>,
    retry: BackoffPolicy,
}

impl std::fmt::Debug for PathResolver {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PathResolver").field("catalog", &self.catalog.names()).finish()
    }
}

impl PathResolver {
    pub fn new(
        catalog: Arc<DatabaseCatalog>,
        store: Arc<dyn DataStore>,
        retry: BackoffPolicy,
    ) -> Self {
        Self { catalog, store, retry }
    }

    pub fn catalog(&self) -> &DatabaseCatalog {
        &self.catalog
    }

    /// Resolves a slash-delimited xpath against `target`
    pub async fn resolve(
        &self,
        xpath: &str,
        target: &str,
    ) -> Result<ResolvedPath> {
        // Target first: an unknown target is reported even for a bad xpath
        self.check_target(target)?;
        let elems = parse_xpath(xpath)?;
        self.resolve_elems(target, elems).await
    }

    /// Resolves already split path elements against `target`
    pub async fn resolve_elems(
        &self,
        target: &str,
        elems: Vec<String>,
    ) -> Result<ResolvedPath> {
        self.check_target(target)?;
        let xpath = elems.join("/");
        validate_elems(&xpath, &elems)?;

        if target == OTHERS_TARGET {
            return Self::resolve_virtual(target, elems);
        }

        let spec = self
            .catalog
            .get(target)
            .ok_or_else(|| ResolveError::InvalidTarget(target.to_string()))?;

        let source = match elems.as_slice() {
            [table] => DataSource::Table {
                db: spec.name.clone(),
                table: table.clone(),
                prefix: spec.table_prefix(table),
            },
            [table, entry] => DataSource::Entry {
                db: spec.name.clone(),
                key: self.entry_key(spec, table, entry).await?,
            },
            [table, entry, field] => DataSource::Field {
                db: spec.name.clone(),
                key: self.entry_key(spec, table, entry).await?,
                field: field.clone(),
            },
            _ => {
                return Err(ResolveError::InvalidPath {
                    path: xpath,
                    reason: format!("expected at most 3 elements, got {}", elems.len()),
                }
                .into())
            }
        };

        if !self.exists(&source).await? {
            return Err(ResolveError::PathNotFound {
                target: target.to_string(),
                path: xpath,
            }
            .into());
        }

        let policy = spec.policy_for(&elems[0]);
        debug!(target, path = %xpath, ?source, ?policy, "resolved path");
        Ok(ResolvedPath {
            target: target.to_string(),
            elems,
            source,
            policy,
        })
    }

    fn check_target(
        &self,
        target: &str,
    ) -> std::result::Result<(), ResolveError> {
        if target == OTHERS_TARGET || self.catalog.get(target).is_some() {
            Ok(())
        } else {
            Err(ResolveError::InvalidTarget(target.to_string()))
        }
    }

    fn resolve_virtual(
        target: &str,
        elems: Vec<String>,
    ) -> Result<ResolvedPath> {
        if elems.iter().map(String::as_str).eq(OSVERSION_BUILD) {
            return Ok(ResolvedPath {
                target: target.to_string(),
                elems,
                source: DataSource::Virtual(VirtualPath::OsVersionBuild),
                policy: TargetDefinedPolicy::OnChange,
            });
        }
        Err(ResolveError::InvalidPath {
            path: elems.join("/"),
            reason: format!("unknown path for virtual target {}", target),
        }
        .into())
    }

    /// Store key of `entry`, translating counter names through the name maps
    async fn entry_key(
        &self,
        spec: &DatabaseSpec,
        table: &str,
        entry: &str,
    ) -> Result<String> {
        if table == COUNTERS_TABLE {
            for map in &spec.name_maps {
                let oid = read_with_retry(&spec.name, || self.store.get_field(&spec.name, map, entry), self.retry).await?;
                if let Some(oid) = oid {
                    return Ok(spec.key(table, &oid));
                }
            }
        }
        Ok(spec.key(table, entry))
    }

    async fn exists(
        &self,
        source: &DataSource,
    ) -> Result<bool> {
        let found = match source {
            DataSource::Table { db, prefix, .. } => {
                !read_with_retry(db, || self.store.scan_prefix(db, prefix), self.retry).await?.is_empty()
            }
            DataSource::Entry { db, key } => read_with_retry(db, || self.store.get_entry(db, key), self.retry)
                .await?
                .is_some(),
            DataSource::Field { db, key, field } => {
                read_with_retry(db, || self.store.get_field(db, key, field), self.retry)
                    .await?
                    .is_some()
            }
            DataSource::Virtual(_) => true,
        };
        Ok(found)
    }
}
