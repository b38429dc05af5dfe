//! Configuration and key-material loading for Spire replicas and clients.
//!
//! Mirrors the layered-TOML approach used elsewhere in the corpus, scaled
//! down to what an ITRC process actually reads at startup: no environment
//! or CLI-argument merging layer, since the CLI surface (spec §6) is small
//! enough that `spire-node` parses it directly with `clap` and only the
//! slower-changing settings -- key directory, reconnect tuning, log filter
//! -- live in a file.

mod cluster_config;
mod error;
mod key_material;
mod paths;
mod replica_config;

pub use cluster_config::{load_cluster_config, save_cluster_config};
pub use error::{ConfigError, Result};
pub use key_material::KeyMaterial;
pub use paths::Paths;
pub use replica_config::{ClientConfig, ReplicaConfig};
