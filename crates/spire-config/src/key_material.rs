use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use spire_cluster::ClusterState;
use spire_crypto::{RsaSigningKey, RsaVerifyingKey, ThresholdKeyShare, ThresholdPublicKey};
use spire_types::{ClientIdx, ReplicaId, HISTORY_SLOTS};

use crate::error::{ConfigError, Result};
use crate::paths::Paths;

fn read_key_bytes(path: &Path) -> Result<[u8; 32]> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.as_slice().try_into().map_err(|_| ConfigError::MalformedKeyFile {
        path: path.to_path_buf(),
        expected: 32,
        got: bytes.len(),
    })
}

/// Every cryptographic key a running replica (or client) needs, reloaded as
/// one unit whenever a reconfiguration rotates the key directory (spec §4.5
/// step 4). Treated as an immutable snapshot: callers hold it behind an
/// `Arc` and swap the whole `Arc` on reload rather than mutating fields in
/// place, so in-flight signature checks never observe a half-updated key
/// set.
#[derive(Debug)]
pub struct KeyMaterial {
    local_replica_id: ReplicaId,
    signing_key: RsaSigningKey,
    verifying_keys: BTreeMap<ReplicaId, RsaVerifyingKey>,
    client_verifying_keys: BTreeMap<ClientIdx, RsaVerifyingKey>,
    threshold_share: Option<ThresholdKeyShare>,
    threshold_public: ThresholdPublicKey,
}

/// Loads whatever client verifying keys are present under `paths`. Client
/// provisioning lags replica provisioning in most deployments (spec §4.2:
/// Inject only needs a given client's key once that client is allowed to
/// submit requests), so a missing file is not an error -- it just means
/// ITRC-Inject will reject that client's requests until the key is placed.
fn load_available_client_keys(paths: &Paths) -> BTreeMap<ClientIdx, RsaVerifyingKey> {
    let mut keys = BTreeMap::new();
    for raw in 0..HISTORY_SLOTS {
        let idx = ClientIdx::new(raw);
        let file = paths.client_verifying_key_file(idx);
        match read_key_bytes(&file) {
            Ok(bytes) => match RsaVerifyingKey::from_bytes(&bytes) {
                Ok(key) => {
                    keys.insert(idx, key);
                }
                Err(err) => tracing::warn!(client = %idx, error = %err, "malformed client verifying key, skipping"),
            },
            Err(_) => continue,
        }
    }
    keys
}

impl KeyMaterial {
    /// Loads every key a replica needs to participate in `cluster`'s current
    /// configuration: its own envelope signing key, every other member's
    /// envelope verifying key, and -- if it is a control-center replica --
    /// its threshold share key plus the shared service key.
    pub fn load_replica(
        paths: &Paths,
        local_replica_id: ReplicaId,
        cluster: &ClusterState,
    ) -> Result<Self> {
        let signing_key = RsaSigningKey::from_bytes(&read_key_bytes(&paths.signing_key_file(local_replica_id))?);

        let mut verifying_keys = BTreeMap::new();
        for slot in &cluster.current().slots {
            let Some(id) = slot.replica_id() else { continue };
            let file = paths.verifying_key_file(id);
            let bytes = read_key_bytes(&file)?;
            verifying_keys.insert(id, RsaVerifyingKey::from_bytes(&bytes)?);
        }

        let mut share_keys = BTreeMap::new();
        for id in cluster.control_center_replicas() {
            let file = paths.verifying_key_file(id);
            let bytes = read_key_bytes(&file)?;
            share_keys.insert(id, RsaVerifyingKey::from_bytes(&bytes)?);
        }
        let service_verifying =
            RsaVerifyingKey::from_bytes(&read_key_bytes(&paths.service_verifying_key_file())?)?;
        let threshold_public = ThresholdPublicKey::new(share_keys, service_verifying);

        let threshold_share = if cluster.is_control_center(local_replica_id) {
            let share_seed = read_key_bytes(&paths.share_key_file(local_replica_id))?;
            let service_seed = read_key_bytes(&paths.service_key_file())?;
            Some(ThresholdKeyShare::new(
                local_replica_id,
                RsaSigningKey::from_bytes(&share_seed),
                RsaSigningKey::from_bytes(&service_seed),
            ))
        } else {
            None
        };

        Ok(Self {
            local_replica_id,
            signing_key,
            verifying_keys,
            client_verifying_keys: load_available_client_keys(paths),
            threshold_share,
            threshold_public,
        })
    }

    /// Loads the subset of key material a client needs: nothing to sign
    /// envelopes with beyond its own key, every replica's verifying key (to
    /// check a reply's outer signature, spec §4.3 step 1), and the threshold
    /// public key to verify assembled signatures.
    pub fn load_client(paths: &Paths, client_signing_seed_file: &Path, cluster: &ClusterState) -> Result<Self> {
        let signing_key = RsaSigningKey::from_bytes(&read_key_bytes(client_signing_seed_file)?);

        let mut verifying_keys = BTreeMap::new();
        for slot in &cluster.current().slots {
            let Some(id) = slot.replica_id() else { continue };
            let bytes = read_key_bytes(&paths.verifying_key_file(id))?;
            verifying_keys.insert(id, RsaVerifyingKey::from_bytes(&bytes)?);
        }

        let mut share_keys = BTreeMap::new();
        for id in cluster.control_center_replicas() {
            let bytes = read_key_bytes(&paths.verifying_key_file(id))?;
            share_keys.insert(id, RsaVerifyingKey::from_bytes(&bytes)?);
        }
        let service_verifying =
            RsaVerifyingKey::from_bytes(&read_key_bytes(&paths.service_verifying_key_file())?)?;

        Ok(Self {
            local_replica_id: ReplicaId::new(u32::MAX),
            signing_key,
            verifying_keys,
            client_verifying_keys: BTreeMap::new(),
            threshold_share: None,
            threshold_public: ThresholdPublicKey::new(share_keys, service_verifying),
        })
    }

    pub fn local_replica_id(&self) -> ReplicaId {
        self.local_replica_id
    }

    pub fn signing_key(&self) -> &RsaSigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self, id: ReplicaId) -> Result<&RsaVerifyingKey> {
        self.verifying_keys
            .get(&id)
            .ok_or(ConfigError::MissingVerifyingKey(id.as_u32()))
    }

    /// The verifying key ITRC-Inject checks an inbound request's outer
    /// signature against (spec §4.2).
    pub fn client_verifying_key(&self, idx: ClientIdx) -> Result<&RsaVerifyingKey> {
        self.client_verifying_keys
            .get(&idx)
            .ok_or(ConfigError::MissingVerifyingKey(idx.as_usize() as u32))
    }

    /// `None` for non-control-center replicas and clients: they never
    /// produce TC shares (spec §4.4).
    pub fn threshold_share(&self) -> Option<&ThresholdKeyShare> {
        self.threshold_share.as_ref()
    }

    pub fn threshold_public(&self) -> &ThresholdPublicKey {
        &self.threshold_public
    }

    /// Generates a throwaway key set for a single replica and writes it to
    /// `paths`' layout, used by tests and by the `keygen` bootstrap path to
    /// avoid hand-writing 32-byte seed files.
    #[cfg(test)]
    pub fn generate_for_test(paths: &Paths, id: ReplicaId, is_control_center: bool, service_seed: [u8; 32]) -> Result<()> {
        fs::create_dir_all(paths.replica_dir(id)).map_err(|source| ConfigError::Io {
            path: paths.replica_dir(id),
            source,
        })?;
        fs::create_dir_all(paths.verifying_dir()).map_err(|source| ConfigError::Io {
            path: paths.verifying_dir(),
            source,
        })?;

        let signing = RsaSigningKey::generate();
        fs::write(paths.signing_key_file(id), signing.to_bytes()).map_err(|source| ConfigError::Io {
            path: paths.signing_key_file(id),
            source,
        })?;
        fs::write(paths.verifying_key_file(id), signing.verifying_key().to_bytes()).map_err(|source| {
            ConfigError::Io {
                path: paths.verifying_key_file(id),
                source,
            }
        })?;

        if is_control_center {
            let share = RsaSigningKey::generate();
            fs::write(paths.share_key_file(id), share.to_bytes()).map_err(|source| ConfigError::Io {
                path: paths.share_key_file(id),
                source,
            })?;
            fs::write(paths.service_key_file(), service_seed).map_err(|source| ConfigError::Io {
                path: paths.service_key_file(),
                source,
            })?;
            let service = RsaSigningKey::from_bytes(&service_seed);
            fs::write(paths.service_verifying_key_file(), service.verifying_key().to_bytes()).map_err(
                |source| ConfigError::Io {
                    path: paths.service_verifying_key_file(),
                    source,
                },
            )?;
        }
        Ok(())
    }

    /// Generates a throwaway signing key for client `idx` and writes its
    /// verifying half where a replica's `load_replica` will find it.
    #[cfg(test)]
    pub fn generate_client_key_for_test(paths: &Paths, idx: ClientIdx) -> Result<RsaSigningKey> {
        let dir = paths.verifying_clients_dir();
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Io { path: dir, source })?;
        let signing = RsaSigningKey::generate();
        let file = paths.client_verifying_key_file(idx);
        fs::write(&file, signing.verifying_key().to_bytes()).map_err(|source| ConfigError::Io { path: file, source })?;
        Ok(signing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_wire::{ConfigMessage, ReplicaSlot, ReplicaType};
    use tempfile::tempdir;

    fn config() -> ConfigMessage {
        ConfigMessage {
            n: 4,
            f: 1,
            k: 0,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 0,
            slots: vec![
                ReplicaSlot {
                    tpm_based_id: 0,
                    replica_type: ReplicaType::ControlCenter,
                    external_addr: "127.0.0.1:10000".into(),
                    internal_addr: "127.0.0.1:11000".into(),
                },
                ReplicaSlot {
                    tpm_based_id: 1,
                    replica_type: ReplicaType::ControlCenter,
                    external_addr: "127.0.0.1:10001".into(),
                    internal_addr: "127.0.0.1:11001".into(),
                },
                ReplicaSlot {
                    tpm_based_id: 2,
                    replica_type: ReplicaType::ControlCenter,
                    external_addr: "127.0.0.1:10002".into(),
                    internal_addr: "127.0.0.1:11002".into(),
                },
                ReplicaSlot {
                    tpm_based_id: 3,
                    replica_type: ReplicaType::ControlCenter,
                    external_addr: "127.0.0.1:10003".into(),
                    internal_addr: "127.0.0.1:11003".into(),
                },
            ],
            global_configuration_number: 1,
        }
    }

    #[test]
    fn loads_full_key_set_for_control_center_replica() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let cluster = ClusterState::new(config());

        for id in 0..4 {
            KeyMaterial::generate_for_test(&paths, ReplicaId::new(id), true, [7u8; 32]).unwrap();
        }

        let km = KeyMaterial::load_replica(&paths, ReplicaId::new(0), &cluster).unwrap();
        assert_eq!(km.local_replica_id(), ReplicaId::new(0));
        assert!(km.threshold_share().is_some());
        assert!(km.verifying_key(ReplicaId::new(2)).is_ok());
    }

    #[test]
    fn missing_verifying_key_is_reported() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let cluster = ClusterState::new(config());
        let err = KeyMaterial::load_replica(&paths, ReplicaId::new(0), &cluster).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn client_keys_are_loaded_when_present_and_absent_otherwise() {
        use spire_types::ClientIdx;

        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let cluster = ClusterState::new(config());
        for id in 0..4 {
            KeyMaterial::generate_for_test(&paths, ReplicaId::new(id), true, [7u8; 32]).unwrap();
        }
        let hmi_0 = ClientIdx::new(64);
        KeyMaterial::generate_client_key_for_test(&paths, hmi_0).unwrap();

        let km = KeyMaterial::load_replica(&paths, ReplicaId::new(0), &cluster).unwrap();
        assert!(km.client_verifying_key(hmi_0).is_ok());
        assert!(km.client_verifying_key(ClientIdx::new(0)).is_err());
    }
}
