use std::collections::HashMap;

use crate::DatabaseConfig;
use crate::TargetDefinedPolicy;

/// Runtime view of one configured logical database
#[derive(Debug, Clone)]
pub struct DatabaseSpec {
    pub name: String,
    pub separator: char,
    pub target_defined: TargetDefinedPolicy,
    pub table_policies: HashMap<String, TargetDefinedPolicy>,
    pub name_maps: Vec<String>,
}

impl DatabaseSpec {
    /// Builds the store key of `entry` inside `table`, e.g. `COUNTERS:oid:0x1`
    pub fn key(
        &self,
        table: &str,
        entry: &str,
    ) -> String {
        format!("{}{}{}", table, self.separator, entry)
    }

    /// Prefix shared by every key of `table`
    pub fn table_prefix(
        &self,
        table: &str,
    ) -> String {
        format!("{}{}", table, self.separator)
    }

    /// TARGET_DEFINED behaviour for `table`
    pub fn policy_for(
        &self,
        table: &str,
    ) -> TargetDefinedPolicy {
        self.table_policies.get(table).copied().unwrap_or(self.target_defined)
    }
}

impl From<&DatabaseConfig> for DatabaseSpec {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            // validated to be exactly one character
            separator: config.separator.chars().next().unwrap_or(':'),
            target_defined: config.target_defined,
            table_policies: config
                .table_policies
                .iter()
                .map(|p| (p.table.clone(), p.policy))
                .collect(),
            name_maps: config.name_maps.clone(),
        }
    }
}

/// Catalog of the logical databases that can be used as targets
#[derive(Debug, Clone, Default)]
pub struct DatabaseCatalog {
    databases: HashMap<String, DatabaseSpec>,
}

impl DatabaseCatalog {
    pub fn from_config(databases: &[DatabaseConfig]) -> Self {
        Self {
            databases: databases
                .iter()
                .map(|db| (db.name.clone(), DatabaseSpec::from(db)))
                .collect(),
        }
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&DatabaseSpec> {
        self.databases.get(name)
    }

    /// Database names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }
}
