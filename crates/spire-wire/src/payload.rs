use serde::{Deserialize, Serialize};
use spire_crypto::{ThresholdShare, ThresholdSignature};
use spire_types::{ClientIdx, Ordinal, ReplicaId, SeqPair};

use crate::config_message::ConfigMessage;

/// RTU proxy → Master (spec §4.6 FROM_CLIENT/FROM_EXTERNAL, wrapped in an
/// `Update`; also appears FROM_PRIME once ordered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtuData {
    pub seq: SeqPair,
    pub rtu_id: u32,
    pub generator_id: Option<u32>,
    pub data: Vec<u8>,
}

/// Master → RTU proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtuFeedback {
    pub seq: SeqPair,
    pub sub: u32,
    pub rtu: u32,
    pub offset: u32,
    pub val: i32,
}

/// HMI → Master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmiCommand {
    pub seq: SeqPair,
    pub hmi_id: u32,
    pub kind: i32,
    pub ttip_pos: i32,
}

/// Master → HMI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmiUpdate {
    pub seq: SeqPair,
    pub status: Vec<u8>,
}

/// Benchmark round trip (client → Master → client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkPayload {
    pub seq: SeqPair,
    pub ping_sec: u32,
    pub ping_usec: u32,
    pub pong_sec: u32,
    pub pong_usec: u32,
}

/// A SCADA-domain payload: what the state machine consumes and produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScadaPayload {
    RtuData(RtuData),
    RtuFeedback(RtuFeedback),
    HmiCommand(HmiCommand),
    HmiUpdate(HmiUpdate),
    Benchmark(BenchmarkPayload),
}

impl ScadaPayload {
    /// The `seq_pair` every real SCADA payload carries (spec §4.1: compared
    /// against `progress[client_idx]` to detect duplicates).
    pub fn seq(&self) -> SeqPair {
        match self {
            ScadaPayload::RtuData(p) => p.seq,
            ScadaPayload::RtuFeedback(p) => p.seq,
            ScadaPayload::HmiCommand(p) => p.seq,
            ScadaPayload::HmiUpdate(p) => p.seq,
            ScadaPayload::Benchmark(p) => p.seq,
        }
    }

    pub fn client_idx(&self, hmi_base: u32, benchmark_idx: u32) -> ClientIdx {
        match self {
            ScadaPayload::RtuData(p) => ClientIdx::new(p.rtu_id),
            ScadaPayload::RtuFeedback(p) => ClientIdx::new(p.rtu),
            ScadaPayload::HmiCommand(p) => ClientIdx::new(hmi_base + p.hmi_id),
            ScadaPayload::HmiUpdate(_) => ClientIdx::new(benchmark_idx), // not client-indexed on this path
            ScadaPayload::Benchmark(_) => ClientIdx::new(benchmark_idx),
        }
    }
}

/// State-transfer snapshot, carried on `STATE_XFER` (spec §3 `StNode`, §4.1
/// "State-transfer application").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateXferPayload {
    pub ordinal: Ordinal,
    pub target: ReplicaId,
    pub latest_update: Vec<SeqPair>,
    pub state: Vec<u8>,
}

/// The typed payload of a [`crate::Envelope`]. Variant selection follows the
/// packet-validation matrix in spec §4.6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Client → replica, wrapped for injection into Prime.
    Update { seq: SeqPair, scada: ScadaPayload },
    /// Prime-ordered control tags (spec §4.1).
    PrimeNoOp,
    PrimeStateTransfer { target: ReplicaId },
    PrimeSystemReset,
    PrimeSystemReconf(ConfigMessage),
    /// Prime-ordered genuine SCADA payload, or a Master → SM / → client reply.
    Scada(ScadaPayload),
    /// Partial threshold signature over `ordinal ∥ payload` (spec §4.4).
    TcShare {
        ordinal: Ordinal,
        payload: Box<ScadaPayload>,
        share: ThresholdShare,
    },
    /// Assembled threshold-signed reply (spec §4.1 TC-queue drain).
    TcFinal {
        ordinal: Ordinal,
        payload: Box<ScadaPayload>,
        signature: ThresholdSignature,
    },
    /// A state snapshot offered for state transfer.
    StateXfer(StateXferPayload),
    /// Out-of-band reconfiguration, forwarded through Prime (spec §4.5).
    PrimeOobConfigMsg(ConfigMessage),
    /// Master → local state machine: restart the ordinal space.
    SystemReset,
}

impl MessagePayload {
    pub fn type_tag(&self) -> spire_types::MessageType {
        use spire_types::MessageType as T;
        match self {
            MessagePayload::Update { .. } => T::Update,
            MessagePayload::PrimeNoOp => T::PrimeNoOp,
            MessagePayload::PrimeStateTransfer { .. } => T::PrimeStateTransfer,
            MessagePayload::PrimeSystemReset => T::PrimeSystemReset,
            MessagePayload::PrimeSystemReconf(_) => T::PrimeSystemReconf,
            MessagePayload::Scada(ScadaPayload::RtuData(_)) => T::RtuData,
            MessagePayload::Scada(ScadaPayload::RtuFeedback(_)) => T::RtuFeedback,
            MessagePayload::Scada(ScadaPayload::HmiCommand(_)) => T::HmiCommand,
            MessagePayload::Scada(ScadaPayload::HmiUpdate(_)) => T::HmiUpdate,
            MessagePayload::Scada(ScadaPayload::Benchmark(_)) => T::Benchmark,
            MessagePayload::TcShare { .. } => T::TcShare,
            MessagePayload::TcFinal { .. } => T::TcFinal,
            MessagePayload::StateXfer(_) => T::StateXfer,
            MessagePayload::PrimeOobConfigMsg(_) => T::PrimeOobConfigMsg,
            MessagePayload::SystemReset => T::SystemReset,
        }
    }
}
