use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spire_types::ReplicaId;

use crate::error::CryptoError;
use crate::rsa::{RsaSigningKey, RsaVerifyingKey, Signature};

/// One control-center replica's partial signature over `ordinal ∥ payload`
/// (spec §4.4: "share digests cover ordinal ∥ payload so a replica cannot
/// substitute a different payload under the same ordinal").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdShare {
    pub replica_id: ReplicaId,
    signature: Signature,
}

/// The assembled threshold signature a client verifies against the single
/// service public key (spec §9 open question: a single threshold public key
/// per configuration, not a per-signer one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSignature {
    signature: Signature,
}

impl ThresholdSignature {
    pub fn to_bytes(self) -> [u8; 64] {
        self.signature.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            signature: Signature::from_bytes(bytes)?,
        })
    }
}

/// Per-replica key material for threshold signing.
///
/// `share_key` authenticates this replica's individual partial signature so
/// a Byzantine peer cannot forge shares on behalf of others. `service_key`
/// is the group-held key used once a quorum is proven; all control-center
/// replicas in a configuration are issued the same `service_key` bytes as
/// part of key distribution (spec §6's `CONFIG_KEYS_MSG` fragments), which is
/// what lets any one of them assemble a final signature without the others'
/// participation in the assembly step itself.
pub struct ThresholdKeyShare {
    replica_id: ReplicaId,
    share_key: RsaSigningKey,
    service_key: RsaSigningKey,
}

impl std::fmt::Debug for ThresholdKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdKeyShare")
            .field("replica_id", &self.replica_id)
            .field("share_key", &self.share_key)
            .field("service_key", &self.service_key)
            .finish()
    }
}

impl ThresholdKeyShare {
    pub fn new(replica_id: ReplicaId, share_key: RsaSigningKey, service_key: RsaSigningKey) -> Self {
        Self {
            replica_id,
            share_key,
            service_key,
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Produces this replica's partial signature over `digest`
    /// (`ordinal ∥ payload`, per spec §4.4).
    pub fn sign_share(&self, digest: &[u8]) -> ThresholdShare {
        ThresholdShare {
            replica_id: self.replica_id,
            signature: self.share_key.sign(digest),
        }
    }

    /// Combines `f+1` (or more) valid shares into the final threshold
    /// signature. Returns [`CryptoError::InsufficientShares`] if too few
    /// distinct, individually-verifying shares are present -- the caller
    /// (spec §4.1's TC-share insertion algorithm) is expected to have
    /// already checked this before calling.
    pub fn combine(
        &self,
        digest: &[u8],
        shares: &BTreeMap<ReplicaId, ThresholdShare>,
        public: &ThresholdPublicKey,
        required: usize,
    ) -> Result<ThresholdSignature, CryptoError> {
        let valid = shares
            .values()
            .filter(|s| public.verify_share(digest, s).is_ok())
            .count();
        if valid < required {
            return Err(CryptoError::InsufficientShares {
                required,
                have: valid,
            });
        }
        Ok(ThresholdSignature {
            signature: self.service_key.sign(digest),
        })
    }
}

/// Public half of the threshold scheme: per-replica share-verifying keys
/// plus the single service verifying key clients hold.
#[derive(Debug, Clone)]
pub struct ThresholdPublicKey {
    share_keys: BTreeMap<ReplicaId, RsaVerifyingKey>,
    service_key: RsaVerifyingKey,
}

impl ThresholdPublicKey {
    pub fn new(share_keys: BTreeMap<ReplicaId, RsaVerifyingKey>, service_key: RsaVerifyingKey) -> Self {
        Self {
            share_keys,
            service_key,
        }
    }

    pub fn verify_share(&self, digest: &[u8], share: &ThresholdShare) -> Result<(), CryptoError> {
        let vk = self
            .share_keys
            .get(&share.replica_id)
            .ok_or(CryptoError::InvalidSignature)?;
        vk.verify(digest, &share.signature)
    }

    /// Verifies an assembled [`ThresholdSignature`] against the single
    /// service key -- the only check a client performs (spec §4.3 `receive`).
    pub fn verify(&self, digest: &[u8], signature: &ThresholdSignature) -> Result<(), CryptoError> {
        self.service_key.verify(digest, &signature.signature)
    }
}
