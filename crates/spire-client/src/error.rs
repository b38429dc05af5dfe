use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors an ITRC-Client proxy can raise (spec §4.3). `receive` errors are
/// meant to be logged and dropped by the caller, the same "drop, do not
/// surface upward" policy `spire-server` applies to per-message faults;
/// only key/config load failures at start-up are fatal to the owning
/// process.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] spire_wire::WireError),

    #[error(transparent)]
    Crypto(#[from] spire_crypto::CryptoError),

    #[error(transparent)]
    Config(#[from] spire_config::ConfigError),

    #[error("failed to decode message: {0}")]
    Codec(#[from] postcard::Error),

    #[error("reply carried payload type {0:?}, not TC_FINAL or not TO_CLIENT-whitelisted")]
    UnexpectedPayload(spire_types::MessageType),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
