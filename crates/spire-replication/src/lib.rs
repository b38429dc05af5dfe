//! # spire-replication
//!
//! The ITRC-Master replication core (spec §4.1): a pure, testable state
//! machine that turns Prime-ordered payloads, local state-machine replies,
//! internal-overlay traffic, and configuration-agent proposals into the
//! effects an imperative shell (`spire-server`) must carry out. No field in
//! [`ReplicaState`] is touched by I/O directly -- every `on_*` method
//! consumes `self` and returns the updated state alongside a
//! [`ReplicationOutput`] describing what to send, inject, or hand to the
//! local state machine.

mod error;
mod history;
mod internal;
mod normal;
mod output;
mod queues;
mod reconfig;
mod state;
mod transfer;

#[cfg(test)]
mod tests;

pub use error::{ReplicationError, Result};
pub use history::{Progress, UpdateHistory};
pub use normal::SmReply;
pub use output::{InjectSignal, InternalTarget, ReplicationOutput};
pub use queues::{StNode, StSnapshot, TcNode};
pub use state::ReplicaState;
