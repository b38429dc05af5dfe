//! # spire-types: Core types for the Spire ITRC
//!
//! Shared types used across the intrusion-tolerant replication channel:
//! - Total-order labels ([`Ordinal`]) produced by the external BFT ordering
//!   engine ("Prime")
//! - Client update identifiers ([`SeqPair`])
//! - Entity IDs ([`ReplicaId`], `ClientIdx`)
//! - Message type tags ([`MessageType`])
//! - Byzantine/crash-tolerance parameters and cluster constants

mod constants;
mod ids;
mod message_type;
mod ordinal;
mod seq_pair;

pub use constants::*;
pub use ids::{ClientIdx, ReplicaId};
pub use message_type::MessageType;
pub use ordinal::Ordinal;
pub use seq_pair::SeqPair;
