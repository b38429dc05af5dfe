use spire_types::ReplicaId;
use spire_wire::{Envelope, MessagePayload};

/// Where an outgoing internal-overlay envelope goes (spec §4.1 `on_sm_reply`,
/// "broadcast to all other control-center replicas" vs. the state-transfer
/// unicast to a single `target`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalTarget {
    Broadcast,
    Unicast(ReplicaId),
}

/// A request the Master hands to the Inject thread (spec §4.2): either ask
/// Prime for a state-transfer round trip, or note that a reconfiguration
/// has been fully applied so Inject can reconnect under the new addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectSignal {
    RequestStateTransfer,
    /// Tear down both overlay sockets and, if still a member of the new
    /// configuration, reconnect under the new addresses (spec §4.5 step 5).
    ReconfigurationApplied,
}

/// Everything a single replication operation produced: messages to hand to
/// the local state machine, signals for the Inject thread, internal-overlay
/// traffic, and client-overlay replies. The caller (the imperative shell in
/// `spire-server`) is responsible for actually sending these; the
/// replication core never performs I/O itself.
#[derive(Debug, Clone, Default)]
pub struct ReplicationOutput {
    pub to_state_machine: Vec<MessagePayload>,
    pub to_inject: Vec<InjectSignal>,
    pub to_internal: Vec<(InternalTarget, Envelope)>,
    pub to_client: Vec<Envelope>,
    /// Out-of-band configuration envelopes forwarded into Prime for
    /// ordering (spec §4.1 `on_config_agent_message`).
    pub to_prime: Vec<Envelope>,
}

impl ReplicationOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.to_state_machine.is_empty()
            && self.to_inject.is_empty()
            && self.to_internal.is_empty()
            && self.to_client.is_empty()
            && self.to_prime.is_empty()
    }

    pub fn merge(&mut self, other: ReplicationOutput) {
        self.to_state_machine.extend(other.to_state_machine);
        self.to_inject.extend(other.to_inject);
        self.to_internal.extend(other.to_internal);
        self.to_client.extend(other.to_client);
        self.to_prime.extend(other.to_prime);
    }
}
