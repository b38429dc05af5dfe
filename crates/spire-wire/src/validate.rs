use spire_types::{ReplicaId, EMS_NUM_GENERATORS, NUM_RTU};

use crate::envelope::Envelope;
use crate::error::WireError;
use crate::payload::{MessagePayload, ScadaPayload};

/// The five validation gates of spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FromClient,
    FromPrime,
    FromSmMain,
    FromInternal,
    ToClient,
}

/// Context a stage needs beyond the envelope itself.
pub struct ValidationContext<'a> {
    pub local_replica_id: ReplicaId,
    pub current_replica_set: &'a [ReplicaId],
}

fn type_allowed(stage: Stage, payload: &MessagePayload) -> bool {
    use MessagePayload as P;
    matches!(
        (stage, payload),
        (Stage::FromClient, P::Update { .. })
            | (Stage::FromPrime, P::PrimeNoOp)
            | (Stage::FromPrime, P::PrimeStateTransfer { .. })
            | (Stage::FromPrime, P::PrimeSystemReset)
            | (Stage::FromPrime, P::PrimeSystemReconf(_))
            | (Stage::FromPrime, P::Scada(ScadaPayload::HmiCommand(_)))
            | (Stage::FromPrime, P::Scada(ScadaPayload::RtuData(_)))
            | (Stage::FromPrime, P::Scada(ScadaPayload::Benchmark(_)))
            | (Stage::FromSmMain, P::Scada(ScadaPayload::HmiUpdate(_)))
            | (Stage::FromSmMain, P::Scada(ScadaPayload::RtuFeedback(_)))
            | (Stage::FromSmMain, P::Scada(ScadaPayload::Benchmark(_)))
            | (Stage::FromSmMain, P::StateXfer(_))
            | (Stage::FromInternal, P::TcShare { .. })
            | (Stage::FromInternal, P::StateXfer(_))
            | (Stage::ToClient, P::TcFinal { .. })
    )
}

/// Type-specific field checks (spec §4.6's second table).
fn validate_fields(payload: &MessagePayload) -> Result<(), WireError> {
    match payload {
        MessagePayload::Scada(ScadaPayload::RtuData(r)) => {
            if r.rtu_id >= NUM_RTU {
                return Err(WireError::RtuIdOutOfRange {
                    rtu_id: r.rtu_id,
                    max: NUM_RTU,
                });
            }
            if r.seq.seq_num == 0 {
                return Err(WireError::ZeroRtuSeqNum);
            }
            if let Some(gen_id) = r.generator_id {
                if gen_id >= EMS_NUM_GENERATORS {
                    return Err(WireError::GeneratorIdOutOfRange {
                        id: gen_id,
                        max: EMS_NUM_GENERATORS,
                    });
                }
            }
            Ok(())
        }
        MessagePayload::PrimeNoOp | MessagePayload::PrimeSystemReset => {
            // accepted only if sender id equals the local replica id
            Ok(())
        }
        MessagePayload::PrimeStateTransfer { .. } => Ok(()),
        _ => Ok(()),
    }
}

fn validate_sender(payload: &MessagePayload, sender: ReplicaId, ctx: &ValidationContext) -> Result<(), WireError> {
    match payload {
        MessagePayload::PrimeNoOp | MessagePayload::PrimeSystemReset => {
            if sender != ctx.local_replica_id {
                return Err(WireError::SenderNotLocal {
                    sender,
                    local: ctx.local_replica_id,
                });
            }
            Ok(())
        }
        MessagePayload::PrimeStateTransfer { .. } => {
            if !ctx.current_replica_set.contains(&sender) {
                return Err(WireError::SenderNotInReplicaSet(sender));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Validates `envelope` against the packet-validation matrix for `stage`
/// (spec §4.6). Does not verify the outer signature -- callers check that
/// separately since some stages (e.g. `FromSmMain`, a local IPC hop) carry
/// no meaningful external signature.
pub fn validate(stage: Stage, envelope: &Envelope, ctx: &ValidationContext) -> Result<(), WireError> {
    if !type_allowed(stage, &envelope.payload) {
        return Err(WireError::RejectedType(envelope.type_tag()));
    }
    validate_fields(&envelope.payload)?;
    validate_sender(&envelope.payload, envelope.machine_id, ctx)
}
