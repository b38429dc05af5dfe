//! # spire-wire
//!
//! The wire envelope (spec §6), the typed payloads it carries, and the
//! packet-validation matrix (spec §4.6) that gates which payload types are
//! accepted at each stage of the pipeline.

mod config_message;
mod envelope;
mod error;
mod payload;
mod validate;

pub use config_message::{ConfigMessage, ReplicaSlot, ReplicaType};
pub use envelope::{tc_digest, Envelope};
pub use error::WireError;
pub use payload::{
    BenchmarkPayload, HmiCommand, HmiUpdate, MessagePayload, RtuData, RtuFeedback, ScadaPayload,
    StateXferPayload,
};
pub use validate::{validate, Stage, ValidationContext};
