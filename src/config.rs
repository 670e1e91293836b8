//! Configuration management for the model bridge
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (bridge.toml)
//! - Environment variables (BRIDGE__*)
//!
//! ## Example config file (bridge.toml):
//! ```toml
//! [identity]
//! domain_id = "issues"
//! connector_id = "jira"
//! instance_id = "jira-main"
//!
//! [definitions]
//! directories = ["./transformations"]
//! extension = "transformation"
//!
//! [graph]
//! internal_prefix = "internal-"
//!
//! [types]
//! path = "./types.json"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::DEFAULT_INTERNAL_PREFIX;
use crate::loader::LoadConfig;
use crate::record::ConnectorIdentity;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Identity stamped on flattened records
    #[serde(default)]
    pub identity: ConnectorIdentity,

    /// Where transformation definitions live
    #[serde(default)]
    pub definitions: DefinitionsConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    /// Type descriptor source
    #[serde(default)]
    pub types: TypesConfig,
}

/// Definition file discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    /// Directories scanned for definition files
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Definition file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Relative path prefixes skipped while scanning
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Prefix of ids assigned to descriptions without an explicit id
    #[serde(default = "default_internal_prefix")]
    pub internal_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypesConfig {
    /// JSON file with an array of type descriptors
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_extension() -> String {
    "transformation".to_string()
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["target/".to_string(), ".git/".to_string()]
}

fn default_internal_prefix() -> String {
    DEFAULT_INTERNAL_PREFIX.to_string()
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            extension: default_extension(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            internal_prefix: default_internal_prefix(),
        }
    }
}

impl DefinitionsConfig {
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            extension: self.extension.clone(),
            skip_prefixes: self.skip_prefixes.clone(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file when given
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["bridge.toml", ".bridge.toml", "config/bridge.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "bridge") {
            let xdg_config = config_dir.config_dir().join("bridge.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // BRIDGE__GRAPH__INTERNAL_PREFIX=... style variables
        builder = builder.add_source(
            Environment::with_prefix("BRIDGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Definition directories resolved against the working directory
    pub fn definition_directories(&self) -> Vec<PathBuf> {
        self.definitions
            .directories
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir().unwrap_or_default().join(p)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.definitions.extension, "transformation");
        assert_eq!(config.graph.internal_prefix, "internal-");
        assert!(config.types.path.is_none());
    }

    #[test]
    fn test_serialize_config() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[identity]"));
        assert!(toml_str.contains("[definitions]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[identity]\ndomain_id = \"d\"\nconnector_id = \"c\"\ninstance_id = \"i\"\n\n[graph]\ninternal_prefix = \"gen-\"\n",
        )
        .unwrap();

        let config = BridgeConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.identity.connector_id, "c");
        assert_eq!(config.graph.internal_prefix, "gen-");
        assert_eq!(config.definitions.extension, "transformation");
    }
}
