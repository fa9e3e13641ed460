use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use config::Config;
use config::File;
use config::FileFormat;
use tracing::debug;
use tracing::warn;

use crate::constants::BUILD_VERSION_FIELD;

/// Build and platform information served under the `OTHERS` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    fields: BTreeMap<String, String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            BUILD_VERSION_FIELD.to_string(),
            format!("sonic-telemetry.{}", env!("CARGO_PKG_VERSION")),
        );
        Self { fields }
    }
}

impl VersionInfo {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        let mut info = Self::default();
        info.fields.extend(fields);
        info
    }

    /// Reads a `sonic_version.yml` style YAML file.
    ///
    /// A missing or unreadable file falls back to the crate's own version.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(?path, "version file absent, using built-in version");
            return Self::default();
        }

        let parsed = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize::<HashMap<String, config::Value>>());

        match parsed {
            Ok(table) => {
                let fields = table
                    .into_iter()
                    .filter_map(|(k, v)| v.into_string().ok().map(|v| (k, v)))
                    .collect();
                Self::from_fields(fields)
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to parse version file, using built-in version");
                Self::default()
            }
        }
    }

    pub fn build_version(&self) -> &str {
        self.fields.get(BUILD_VERSION_FIELD).map(String::as_str).unwrap_or_default()
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}
