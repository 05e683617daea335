//! ACL core configuration.
//!
//! Device-profile limits are loaded from JSON or YAML files; every field has
//! a default so a partial file only overrides what it names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive priority range with a default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRange {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub default: u32,
}

impl PriorityRange {
    pub fn contains(&self, priority: u32) -> bool {
        (self.min..=self.max).contains(&priority)
    }
}

/// Limits and ranges of the ACL core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclCoreConfig {
    /// Key blocks allowed per key type
    #[serde(default = "default_max_key_blocks")]
    pub max_key_blocks: usize,

    #[serde(default = "default_max_key_types")]
    pub max_key_types: usize,

    #[serde(default = "default_max_regions")]
    pub max_regions: usize,

    /// Largest logical capacity of a single region
    #[serde(default = "default_max_rules_per_region")]
    pub max_rules_per_region: u32,

    /// Hardware rows times key-block width available to all regions
    #[serde(default = "default_hw_rule_budget")]
    pub hw_rule_budget: u64,

    #[serde(default = "default_max_acls")]
    pub max_acls: usize,

    #[serde(default = "default_max_groups")]
    pub max_groups: usize,

    #[serde(default = "default_max_acls_per_group")]
    pub max_acls_per_group: usize,

    /// Rules accepted by one `set_rules` call
    #[serde(default = "default_max_rule_batch")]
    pub max_rule_batch: usize,

    #[serde(default = "default_max_range_comparators")]
    pub max_range_comparators: usize,

    /// Custom-bytes range comparators allowed at the same time
    #[serde(default = "default_max_custom_bytes_ranges")]
    pub max_custom_bytes_ranges: usize,

    #[serde(default = "default_max_custom_byte_sets")]
    pub max_custom_byte_sets: usize,

    #[serde(default = "default_max_pbs_entries")]
    pub max_pbs_entries: usize,

    #[serde(default = "default_max_port_lists")]
    pub max_port_lists: usize,

    #[serde(default = "default_max_vlan_groups")]
    pub max_vlan_groups: usize,

    #[serde(default = "default_group_priority")]
    pub group_priority: PriorityRange,

    #[serde(default = "default_rule_priority")]
    pub rule_priority: PriorityRange,
}

fn default_max_key_blocks() -> usize {
    6
}

fn default_max_key_types() -> usize {
    64
}

fn default_max_regions() -> usize {
    400
}

fn default_max_rules_per_region() -> u32 {
    8192
}

fn default_hw_rule_budget() -> u64 {
    65536
}

fn default_max_acls() -> usize {
    512
}

fn default_max_groups() -> usize {
    256
}

fn default_max_acls_per_group() -> usize {
    16
}

fn default_max_rule_batch() -> usize {
    1024
}

fn default_max_range_comparators() -> usize {
    16
}

fn default_max_custom_bytes_ranges() -> usize {
    2
}

fn default_max_custom_byte_sets() -> usize {
    16
}

fn default_max_pbs_entries() -> usize {
    1024
}

fn default_max_port_lists() -> usize {
    256
}

fn default_max_vlan_groups() -> usize {
    64
}

fn default_group_priority() -> PriorityRange {
    PriorityRange {
        min: 1,
        max: 0xFF,
        default: 8,
    }
}

fn default_rule_priority() -> PriorityRange {
    PriorityRange {
        min: 1,
        max: 0xFF_FFFF,
        default: 1,
    }
}

impl Default for AclCoreConfig {
    fn default() -> Self {
        Self {
            max_key_blocks: default_max_key_blocks(),
            max_key_types: default_max_key_types(),
            max_regions: default_max_regions(),
            max_rules_per_region: default_max_rules_per_region(),
            hw_rule_budget: default_hw_rule_budget(),
            max_acls: default_max_acls(),
            max_groups: default_max_groups(),
            max_acls_per_group: default_max_acls_per_group(),
            max_rule_batch: default_max_rule_batch(),
            max_range_comparators: default_max_range_comparators(),
            max_custom_bytes_ranges: default_max_custom_bytes_ranges(),
            max_custom_byte_sets: default_max_custom_byte_sets(),
            max_pbs_entries: default_max_pbs_entries(),
            max_port_lists: default_max_port_lists(),
            max_vlan_groups: default_max_vlan_groups(),
            group_priority: default_group_priority(),
            rule_priority: default_rule_priority(),
        }
    }
}

impl AclCoreConfig {
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file. `.json` files are parsed as JSON,
    /// anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_key_blocks", self.max_key_blocks),
            ("max_key_types", self.max_key_types),
            ("max_regions", self.max_regions),
            ("max_acls", self.max_acls),
            ("max_groups", self.max_groups),
            ("max_acls_per_group", self.max_acls_per_group),
            ("max_rule_batch", self.max_rule_batch),
            ("max_pbs_entries", self.max_pbs_entries),
            ("max_port_lists", self.max_port_lists),
            ("max_vlan_groups", self.max_vlan_groups),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
        }

        if self.max_rules_per_region == 0 || self.hw_rule_budget == 0 {
            return Err(ConfigError::Invalid(
                "region capacity limits must be > 0".to_string(),
            ));
        }

        if self.max_custom_bytes_ranges > self.max_range_comparators {
            return Err(ConfigError::Invalid(
                "max_custom_bytes_ranges exceeds max_range_comparators".to_string(),
            ));
        }

        for (name, range) in [
            ("group_priority", self.group_priority),
            ("rule_priority", self.rule_priority),
        ] {
            if range.min > range.max || !range.contains(range.default) {
                return Err(ConfigError::Invalid(format!(
                    "{} must satisfy min <= default <= max",
                    name
                )));
            }
        }

        Ok(())
    }
}
