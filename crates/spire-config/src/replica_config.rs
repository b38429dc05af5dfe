use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// On-disk configuration for a single replica process, loaded from
/// `replica.toml` in the directory passed on the command line.
///
/// Only the process-local settings the CLI doesn't already carry live here
/// (spec §6 "CLI surface": `replica_id` and the two spines addresses are CLI
/// arguments, not config-file fields, so they round-trip through `spire-node`
/// rather than through this struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Directory holding `signing.key`, `share.key`, `verifying/`, etc.
    pub key_dir: PathBuf,
    /// Path to the `ConfigMessage` this replica boots with, before any
    /// reconfiguration overwrites it (spec §4.5).
    pub cluster_config_file: PathBuf,
    /// Reconnect backoff after a failed `spines_sendto` (spec §4.2).
    pub reconnect_interval_ms: u64,
    /// Bound on the TC-share and state-transfer queues before a replica
    /// starts shedding (maps to `MAX_NUM_SERVER_SLOTS`-scale backpressure).
    pub queue_capacity: usize,
    pub log_filter: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("./keys"),
            cluster_config_file: PathBuf::from("./cluster.toml"),
            reconnect_interval_ms: 2000,
            queue_capacity: 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl ReplicaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// On-disk configuration for an ITRC-Client process (benchmark client or
/// RTU/HMI proxy, spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub key_dir: PathBuf,
    pub cluster_config_file: PathBuf,
    /// Count of control-center replicas this client unicasts updates to
    /// before falling back to round-robin over the rest (spec §4.3 step 1:
    /// `min(f+k+1, 2*(f+2))`); `0` means derive it from the loaded cluster
    /// configuration instead of overriding it.
    pub fanout_override: usize,
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("./keys"),
            cluster_config_file: PathBuf::from("./cluster.toml"),
            fanout_override: 0,
            log_filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
