// SPDX-License-Identifier: GPL-3.0-only

//! Engine configuration
//!
//! Built once at process start and shared by `Arc`. Every field has a
//! default, so an empty TOML document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SysError};

/// Environment variable overriding [`Config::node_id`]
pub const NODE_ID_ENV: &str = "LOCALPV_NODE_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node this engine provisions on
    pub node_id: String,

    pub tools: ToolPaths,

    /// Per-command timeout; 0 waits forever
    pub command_timeout_secs: u64,

    /// Prefix stripped from volume names to form partition labels
    pub label_prefix: Option<String>,
}

/// Binaries invoked by the engine, as names resolved on `PATH` or absolute paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub lsblk: String,
    pub parted: String,
    pub fdisk: String,
    pub wipefs: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            lsblk: "lsblk".to_string(),
            parted: "parted".to_string(),
            fdisk: "fdisk".to_string(),
            wipefs: "wipefs".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            tools: ToolPaths::default(),
            command_timeout_secs: 120,
            label_prefix: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| SysError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {:?}", path);
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    SysError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(node_id) = lookup(NODE_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.node_id = node_id.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(prefix) = &self.label_prefix
            && (prefix.is_empty() || !is_valid_label(prefix))
        {
            return Err(SysError::Config(format!(
                "label_prefix {:?} is not a valid partition label prefix",
                prefix
            )));
        }

        for (tool, value) in [
            ("lsblk", &self.tools.lsblk),
            ("parted", &self.tools.parted),
            ("fdisk", &self.tools.fdisk),
            ("wipefs", &self.tools.wipefs),
        ] {
            if value.trim().is_empty() {
                return Err(SysError::Config(format!("tools.{tool} must not be empty")));
            }
        }
        Ok(())
    }

    /// Node id, required when acting as a node agent
    pub fn require_node_id(&self) -> Result<&str> {
        if self.node_id.is_empty() {
            return Err(SysError::Config(format!(
                "node_id is not set (use the config file or {NODE_ID_ENV})"
            )));
        }
        Ok(&self.node_id)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    /// Partition label for a volume name.
    ///
    /// The configured prefix is stripped when present; names without it are
    /// used whole.
    pub fn partition_label(&self, volume_name: &str) -> Result<String> {
        let label = match &self.label_prefix {
            Some(prefix) => volume_name.strip_prefix(prefix.as_str()).unwrap_or(volume_name),
            None => volume_name,
        };

        if !is_valid_label(label) {
            return Err(SysError::InvalidName(volume_name.to_string()));
        }
        Ok(label.to_string())
    }
}

/// Labels end up in argv and in parted's colon separated output.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ':' | ';' | '"' | '\''))
}
