use serde::{Deserialize, Serialize};

/// Wire-level type tag, carried in every `SignedMessage` envelope.
///
/// Variant names and grouping follow `scada_packets.h`'s `message_type` enum
/// plus the Prime-facing tags (`PRIME_*`) and the out-of-band config tag;
/// spec §4.6 defines which stages accept which tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Client → replica: a Prime-level update envelope.
    Update,
    /// Replica → Prime: out-of-band reconfiguration, delivered through Prime
    /// so all replicas observe it in the same total order.
    PrimeOobConfigMsg,
    /// Prime → Master: ordinary no-op ordinal (keeps ordinals advancing).
    PrimeNoOp,
    /// Prime → Master: this ordinal is a state-transfer placeholder.
    PrimeStateTransfer,
    /// Prime → Master: Prime has reset and the ordinal space restarts.
    PrimeSystemReset,
    /// Prime → Master: a committed reconfiguration is ready to apply.
    PrimeSystemReconf,
    /// RTU proxy → Master.
    RtuData,
    /// Master → RTU proxy.
    RtuFeedback,
    /// HMI → Master.
    HmiCommand,
    /// Master → HMI.
    HmiUpdate,
    /// Benchmark client round trip, both directions.
    Benchmark,
    /// Replica → replica: a partial threshold-signature share.
    TcShare,
    /// Master → client: the assembled threshold-signed reply.
    TcFinal,
    /// Replica → replica: a state snapshot offered for state transfer.
    StateXfer,
    /// Master → local state machine: restart the ordinal space.
    SystemReset,
}

impl MessageType {
    /// True if this tag is a real SCADA payload carrying a `seq_pair`
    /// (as opposed to a Prime control tag or internal protocol message).
    pub fn is_scada_payload(self) -> bool {
        matches!(
            self,
            MessageType::RtuData
                | MessageType::RtuFeedback
                | MessageType::HmiCommand
                | MessageType::HmiUpdate
                | MessageType::Benchmark
        )
    }
}
