use std::path::{Path, PathBuf};

use spire_types::{ClientIdx, ReplicaId};

/// Layout of a key directory, reloaded wholesale on every reconfiguration
/// (spec §4.5 step 4).
///
/// ```text
/// <key_dir>/
///   replica-<id>/signing.key   per-replica envelope signing seed
///   replica-<id>/share.key     per-replica threshold share-signing seed (control-center only)
///   service.key                shared threshold service-signing seed (control-center only)
///   verifying/<id>.pub         every replica's envelope verifying key
///   service.pub                the threshold service verifying key
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    key_dir: PathBuf,
}

impl Paths {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    pub fn replica_dir(&self, id: ReplicaId) -> PathBuf {
        self.key_dir.join(format!("replica-{}", id.as_u32()))
    }

    pub fn signing_key_file(&self, id: ReplicaId) -> PathBuf {
        self.replica_dir(id).join("signing.key")
    }

    pub fn share_key_file(&self, id: ReplicaId) -> PathBuf {
        self.replica_dir(id).join("share.key")
    }

    pub fn service_key_file(&self) -> PathBuf {
        self.key_dir.join("service.key")
    }

    pub fn verifying_key_file(&self, id: ReplicaId) -> PathBuf {
        self.key_dir.join("verifying").join(format!("{}.pub", id.as_u32()))
    }

    pub fn verifying_dir(&self) -> PathBuf {
        self.key_dir.join("verifying")
    }

    pub fn service_verifying_key_file(&self) -> PathBuf {
        self.key_dir.join("service.pub")
    }

    /// Per-client signing seed, laid out the same way as a replica's own
    /// (spec §4.3: clients sign outer envelopes exactly as replicas do).
    pub fn client_signing_key_file(&self, idx: ClientIdx) -> PathBuf {
        self.key_dir.join(format!("client-{}", idx.as_usize())).join("signing.key")
    }

    /// Where ITRC-Inject looks up a client's verifying key to check an
    /// inbound request's outer signature (spec §4.2).
    pub fn client_verifying_key_file(&self, idx: ClientIdx) -> PathBuf {
        self.key_dir.join("verifying-clients").join(format!("{}.pub", idx.as_usize()))
    }

    pub fn verifying_clients_dir(&self) -> PathBuf {
        self.key_dir.join("verifying-clients")
    }

    pub fn replica_config_file(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join("replica.toml")
    }

    pub fn client_config_file(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join("client.toml")
    }
}
