use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("malformed signature bytes: expected {expected} bytes, got {got}")]
    MalformedSignature { expected: usize, got: usize },
    #[error("malformed key bytes: expected {expected} bytes, got {got}")]
    MalformedKey { expected: usize, got: usize },
    #[error("threshold signature needs {required} shares, only {have} present")]
    InsufficientShares { required: usize, have: usize },
}
