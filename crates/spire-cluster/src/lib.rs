//! # spire-cluster
//!
//! Cluster membership: the currently installed [`ConfigMessage`], the
//! per-slot logical id and replica-type tables it implies, and the
//! fencing rule that a `global_configuration_number` must strictly
//! increase before a new configuration is installed (spec §4.5).

mod error;
mod state;

pub use error::{ClusterError, Result};
pub use state::ClusterState;

pub use spire_wire::{ConfigMessage, ReplicaSlot, ReplicaType};
