use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::CodecKind;
use crate::core::{StorageError, UNLIMITED_CAPACITY};

/// Main storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the file disk store
    pub data_dir: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Settings applied to every namespace without an override
    #[serde(default)]
    pub defaults: NamespaceConfig,
    /// Per-namespace overrides
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Namespace settings; absent fields fall back to `defaults`, then to built-ins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Memory cache capacity in cost units, absent means unlimited
    #[serde(default)]
    pub max_in_memory_capacity: Option<u64>,
    #[serde(default)]
    pub codec: Option<CodecKind>,
}

/// Fully resolved settings for one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSettings {
    pub max_in_memory_capacity: u64,
    pub codec: CodecKind,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            max_in_memory_capacity: UNLIMITED_CAPACITY,
            codec: CodecKind::Bincode,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/tierkv"),
            logging: LoggingConfig::default(),
            defaults: NamespaceConfig::default(),
            namespaces: HashMap::new(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: StorageConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(StorageError::InvalidConfig("data_dir is empty".to_string()));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(StorageError::InvalidConfig(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self.namespaces.contains_key("") {
            return Err(StorageError::InvalidConfig(
                "namespace overrides need a non-empty name".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the settings for `namespace`
    pub fn settings_for(&self, namespace: &str) -> NamespaceSettings {
        let builtin = NamespaceSettings::default();
        let specific = self.namespaces.get(namespace);

        NamespaceSettings {
            max_in_memory_capacity: specific
                .and_then(|ns| ns.max_in_memory_capacity)
                .or(self.defaults.max_in_memory_capacity)
                .unwrap_or(builtin.max_in_memory_capacity),
            codec: specific
                .and_then(|ns| ns.codec)
                .or(self.defaults.codec)
                .unwrap_or(builtin.codec),
        }
    }
}
