use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("key file {path} has wrong length: expected {expected} bytes, got {got}")]
    MalformedKeyFile {
        path: PathBuf,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Crypto(#[from] spire_crypto::CryptoError),
    #[error("no key material found for replica {0} under the configured key directory")]
    MissingVerifyingKey(u32),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
