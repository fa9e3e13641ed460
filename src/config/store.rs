use std::collections::HashSet;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::APPL_DB;
use crate::constants::CONFIG_DB;
use crate::constants::COUNTERS_DB;
use crate::constants::COUNTERS_PORT_NAME_MAP;
use crate::constants::COUNTERS_QUEUE_NAME_MAP;
use crate::constants::OTHERS_TARGET;
use crate::constants::STATE_DB;
use crate::Error;
use crate::Result;

/// Which store implementation backs the logical databases
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process local maps, seeded from `seed_file`
    Memory,
    /// Persistent sled trees under `sled_path`
    Sled,
}

/// How a TARGET_DEFINED subscription behaves for paths of a database or table
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetDefinedPolicy {
    /// Periodic sampling at the dispatcher's default interval
    Sample,
    /// Emit only when the value changes
    OnChange,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TablePolicy {
    pub table: String,
    pub policy: TargetDefinedPolicy,
}

/// One logical database of the catalog
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Logical name used as gNMI target, e.g. "COUNTERS_DB"
    pub name: String,

    /// Separator between table and key, e.g. ":" or "|"
    #[serde(default = "default_separator")]
    pub separator: String,

    /// TARGET_DEFINED behaviour for tables without an override
    #[serde(default = "default_target_defined")]
    pub target_defined: TargetDefinedPolicy,

    /// Per-table TARGET_DEFINED overrides
    #[serde(default)]
    pub table_policies: Vec<TablePolicy>,

    /// Tables mapping element names (e.g. "Ethernet0") to object ids
    #[serde(default)]
    pub name_maps: Vec<String>,
}

impl DatabaseConfig {
    pub fn new(
        name: &str,
        separator: &str,
        target_defined: TargetDefinedPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            separator: separator.to_string(),
            target_defined,
            table_policies: Vec::new(),
            name_maps: Vec::new(),
        }
    }

    pub fn with_name_maps(
        mut self,
        name_maps: &[&str],
    ) -> Self {
        self.name_maps = name_maps.iter().map(|m| m.to_string()).collect();
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Directory of the sled database (sled backend only)
    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,

    /// Optional JSON document `{ "<DB>": { "<key>": { "<field>": "<value>" } } }`
    /// loaded into the store at start
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Capacity of the change broadcast channel
    #[serde(default = "default_change_feed_capacity")]
    pub change_feed_capacity: usize,

    /// YAML file with `build_version` and friends, served under the OTHERS target
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,

    /// Logical databases that can be used as targets
    #[serde(default = "default_databases")]
    pub databases: Vec<DatabaseConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sled_path: default_sled_path(),
            seed_file: None,
            change_feed_capacity: default_change_feed_capacity(),
            version_file: default_version_file(),
            databases: default_databases(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.change_feed_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "change_feed_capacity must be greater than 0".into(),
            )));
        }

        if self.backend == StoreBackend::Sled && self.sled_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "sled backend requires sled_path".into(),
            )));
        }

        if self.databases.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "at least one database must be configured".into(),
            )));
        }

        let mut names = HashSet::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "database name cannot be empty".into(),
                )));
            }
            if db.name == OTHERS_TARGET {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{} is a reserved virtual target",
                    OTHERS_TARGET
                ))));
            }
            if db.separator.chars().count() != 1 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "separator of {} must be a single character, got '{}'",
                    db.name, db.separator
                ))));
            }
            if !names.insert(db.name.as_str()) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "database {} configured twice",
                    db.name
                ))));
            }
        }

        Ok(())
    }
}

fn default_separator() -> String {
    ":".into()
}
fn default_target_defined() -> TargetDefinedPolicy {
    TargetDefinedPolicy::OnChange
}
fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_sled_path() -> PathBuf {
    PathBuf::from("./db/telemetry")
}
fn default_change_feed_capacity() -> usize {
    4096
}
fn default_version_file() -> PathBuf {
    PathBuf::from("/etc/sonic/sonic_version.yml")
}
fn default_databases() -> Vec<DatabaseConfig> {
    vec![
        DatabaseConfig::new(APPL_DB, ":", TargetDefinedPolicy::OnChange),
        DatabaseConfig::new(COUNTERS_DB, ":", TargetDefinedPolicy::Sample)
            .with_name_maps(&[COUNTERS_PORT_NAME_MAP, COUNTERS_QUEUE_NAME_MAP]),
        DatabaseConfig::new(CONFIG_DB, "|", TargetDefinedPolicy::OnChange),
        DatabaseConfig::new(STATE_DB, "|", TargetDefinedPolicy::OnChange),
    ]
}
