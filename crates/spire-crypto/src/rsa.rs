use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// A detached signature over an arbitrary byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::invalid_length(v.len(), &"64 bytes"))?;
        Ok(Signature(arr))
    }
}

impl Signature {
    pub fn to_bytes(self) -> [u8; 64] {
        self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::MalformedSignature {
            expected: 64,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

/// The per-replica / per-client signing key covering the "outer RSA
/// signature" field of the wire envelope (spec §6).
///
/// Manual `Debug` avoids ever printing key material.
pub struct RsaSigningKey {
    inner: SigningKey,
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigningKey").field("inner", &"<redacted>").finish()
    }
}

impl RsaSigningKey {
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            inner: SigningKey::from_bytes(seed),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn verifying_key(&self) -> RsaVerifyingKey {
        RsaVerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Signs the bytes covered by the envelope (offset `SIG_SIZE` to end, per
    /// spec §6 -- callers pass exactly that slice).
    pub fn sign(&self, covered_bytes: &[u8]) -> Signature {
        Signature(self.inner.sign(covered_bytes).to_bytes())
    }
}

/// The public half of [`RsaSigningKey`], distributed to every peer that must
/// verify this sender's signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaVerifyingKey {
    inner: VerifyingKey,
}

impl RsaVerifyingKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let inner = VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::MalformedKey {
            expected: 32,
            got: bytes.len(),
        })?;
        Ok(Self { inner })
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn verify(&self, covered_bytes: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        self.inner
            .verify(covered_bytes, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = RsaSigningKey::generate();
        let vk = key.verifying_key();
        let msg = b"ordinal(5,1,1) || payload bytes";

        let sig = key.sign(msg);
        assert!(vk.verify(msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let key = RsaSigningKey::generate();
        let vk = key.verifying_key();
        let sig = key.sign(b"original payload");

        assert!(vk.verify(b"substituted payload", &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let a = RsaSigningKey::generate();
        let b = RsaSigningKey::generate();
        let msg = b"some update";

        let sig = a.sign(msg);
        assert!(b.verifying_key().verify(msg, &sig).is_err());
    }
}
