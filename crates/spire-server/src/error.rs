use thiserror::Error;

/// Result type for replica-process operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Errors a running ITRC-Master or ITRC-Inject can raise, mapped onto the
/// error taxonomy of spec §7. Only [`ServerError::Fatal`] propagates out of
/// the thread's main loop; everything else is logged and dropped in place by
/// the caller, matching the "drop, do not surface upward" policy for
/// transient/auth/protocol/ordering/configuration errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Replication-core error (wraps `spire-replication`'s own, itself a
    /// thin wrapper over `spire-cluster`'s).
    #[error(transparent)]
    Replication(#[from] spire_replication::ReplicationError),

    /// Wire-level error: bad signature, rejected type, malformed payload.
    #[error(transparent)]
    Wire(#[from] spire_wire::WireError),

    /// Key/config loading error.
    #[error(transparent)]
    Config(#[from] spire_config::ConfigError),

    /// Envelope or IPC frame failed to decode.
    #[error("failed to decode message: {0}")]
    Codec(#[from] postcard::Error),

    /// I/O error on an overlay or IPC socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable startup failure (key load, socket bind): the owning
    /// binary exits rather than continuing in a half-initialized state.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}
