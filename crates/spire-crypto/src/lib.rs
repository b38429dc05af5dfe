//! # spire-crypto
//!
//! The ITRC treats RSA signing and threshold-cryptographic signing as
//! external collaborators (spec.md §1): this crate fixes their *operational
//! contract* -- a keypair that signs/verifies byte strings, and a
//! per-ordinal share-collection scheme that combines `f+1` shares into one
//! signature a client can verify against a single service public key -- and
//! backs it with `ed25519-dalek`, the signature primitive the rest of the
//! workspace's corpus already depends on. See DESIGN.md for why this stands
//! in for RSA-OAEP/threshold-RSA rather than vendoring an unused crate.

mod error;
mod rsa;
mod threshold;

pub use error::CryptoError;
pub use rsa::{RsaSigningKey, RsaVerifyingKey, Signature};
pub use threshold::{ThresholdKeyShare, ThresholdPublicKey, ThresholdShare, ThresholdSignature};
