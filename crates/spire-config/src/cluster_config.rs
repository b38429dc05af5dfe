use std::fs;
use std::path::Path;

use spire_wire::ConfigMessage;

use crate::error::{ConfigError, Result};

/// Loads the `ConfigMessage` a replica or client boots with from a TOML
/// file (the config itself is later replaced in memory by `PRIME_SYSTEM_RECONF`
/// / `PRIME_OOB_CONFIG_MSG`, spec §4.5 -- this is only ever the bootstrap
/// read).
pub fn load_cluster_config(path: impl AsRef<Path>) -> Result<ConfigMessage> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

pub fn save_cluster_config(config: &ConfigMessage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_wire::{ReplicaSlot, ReplicaType};
    use tempfile::tempdir;

    fn config() -> ConfigMessage {
        ConfigMessage {
            n: 4,
            f: 1,
            k: 0,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 0,
            slots: vec![ReplicaSlot {
                tpm_based_id: 1,
                replica_type: ReplicaType::ControlCenter,
                external_addr: "127.0.0.1:10000".into(),
                internal_addr: "127.0.0.1:11000".into(),
            }],
            global_configuration_number: 1,
        }
    }

    #[test]
    fn cluster_config_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("cluster.toml");
        save_cluster_config(&config(), &file).unwrap();

        let loaded = load_cluster_config(&file).unwrap();
        assert_eq!(loaded, config());
    }
}
