use serde::{Deserialize, Serialize};
use spire_types::{MessageType, Ordinal, BENCHMARK_CLIENT_IDX, MAX_EMU_RTU};
use spire_wire::{tc_digest, MessagePayload, ScadaPayload, StateXferPayload};

use crate::output::{InjectSignal, InternalTarget, ReplicationOutput};
use crate::queues::TcNode;
use crate::state::ReplicaState;

/// What the local state machine handed back for the head of `ord_queue`
/// (spec §4.1 `on_sm_reply`): either an ordinary SCADA reply to be
/// threshold-signed, or a state snapshot produced because this replica was
/// asked (via a `PRIME_STATE_TRANSFER` ordinal targeting another replica) to
/// supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SmReply {
    Scada(ScadaPayload),
    StateXfer(StateXferPayload),
}

fn is_from_prime_whitelisted(payload: &MessagePayload) -> bool {
    matches!(
        payload.type_tag(),
        MessageType::PrimeNoOp
            | MessageType::PrimeStateTransfer
            | MessageType::PrimeSystemReset
            | MessageType::HmiCommand
            | MessageType::RtuData
            | MessageType::Benchmark
    )
}

impl ReplicaState {
    /// spec §4.1 `on_prime_ordered`: Prime has delivered `payload` at
    /// ordinal `o`. `o` arrives out-of-band on the Prime IPC channel -- the
    /// ordinal itself is Prime's contract, not part of the signed wire
    /// envelope, so it is passed alongside the payload rather than read out
    /// of one.
    pub fn on_prime_ordered(mut self, o: Ordinal, payload: MessagePayload) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        if matches!(payload, MessagePayload::PrimeSystemReset | MessagePayload::PrimeSystemReconf(_)) {
            if let MessagePayload::PrimeSystemReconf(cfg) = &payload {
                if let Err(err) = self.cluster.apply(cfg.clone()) {
                    tracing::warn!(error = %err, "rejected PRIME_SYSTEM_RECONF carried by ordered stream");
                    return (self, output);
                }
                // spec §4.5 steps 4-5: `Master` reloads this replica's own
                // keys under the (still imperative-shell-owned) key
                // directory once it observes this signal, then Inject
                // re-establishes its overlay socket under the new
                // configuration.
                output.to_inject.push(InjectSignal::ReconfigurationApplied);
            }
            self.reset_queues();
            output.to_state_machine.push(MessagePayload::SystemReset);
            return (self, output);
        }

        let is_first = !self.has_received_first_ordinal;
        self.has_received_first_ordinal = true;
        if is_first && !self.recvd_ord.is_consecutive(o) {
            output.to_inject.push(InjectSignal::RequestStateTransfer);
        }

        if !is_first && o <= self.recvd_ord {
            tracing::debug!(ordinal = %o, "dropping Prime restart duplicate");
            return (self, output);
        }

        if self.collecting_signal {
            self.pending_updates.push((o, payload));
            return (self, output);
        }

        let is_state_transfer_for_self =
            matches!(&payload, MessagePayload::PrimeStateTransfer { target } if *target == self.local_replica_id);

        if !is_first && !self.recvd_ord.is_consecutive(o) && !is_state_transfer_for_self {
            tracing::debug!(ordinal = %o, recvd = %self.recvd_ord, "dropping non-consecutive ordinal");
            return (self, output);
        }

        if !is_from_prime_whitelisted(&payload) {
            tracing::warn!(ordinal = %o, "payload type rejected by FROM_PRIME gate, treating as no-op");
            self.insert_skip_node(o);
            self.recvd_ord = o;
            return (self, output);
        }

        match payload {
            MessagePayload::PrimeNoOp => {
                self.insert_skip_node(o);
                self.recvd_ord = o;
            }
            MessagePayload::PrimeStateTransfer { target } if target == self.local_replica_id => {
                self.insert_skip_node(o);
                self.collecting_signal = true;
                let already_collected = {
                    let node = self.st_queue.entry(o).or_default();
                    node.signaled = true;
                    node.collected
                };
                if already_collected {
                    let (new_self, apply_output) = self.apply_state_transfer(o);
                    self = new_self;
                    output.merge(apply_output);
                }
                self.recvd_ord = o;
            }
            MessagePayload::PrimeStateTransfer { .. } => {
                // directed at a different replica: this one is asked to
                // produce a snapshot, so it is a genuine payload for the SM.
                self.ord_queue.push_back(o);
                output.to_state_machine.push(payload);
                self.recvd_ord = o;
            }
            MessagePayload::Scada(scada) => {
                let idx = scada.client_idx(MAX_EMU_RTU, BENCHMARK_CLIENT_IDX);
                if !self.progress.is_new(idx, scada.seq()) {
                    tracing::debug!(ordinal = %o, client = %idx, "duplicate seq_pair, skipping");
                    self.insert_skip_node(o);
                } else {
                    self.progress.set(idx, scada.seq());
                    self.up_hist.set(idx, o, scada.clone());
                    self.ord_queue.push_back(o);
                    output.to_state_machine.push(MessagePayload::Scada(scada));
                }
                self.recvd_ord = o;
            }
            _ => unreachable!("filtered by is_from_prime_whitelisted / the reset branch above"),
        }

        (self, output)
    }

    fn insert_skip_node(&mut self, o: Ordinal) {
        if self.is_control_center() {
            self.tc_queue.entry(o).or_insert_with(TcNode::skip);
        }
    }

    /// spec §4.1 `on_sm_reply`: the state machine produced the reply for
    /// the head of `ord_queue`.
    pub fn on_sm_reply(mut self, reply: SmReply) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        let Some(o) = self.ord_queue.pop_front() else {
            tracing::warn!("on_sm_reply called with an empty ord_queue");
            return (self, output);
        };

        match reply {
            SmReply::StateXfer(mut xfer) => {
                xfer.ordinal = o;
                let envelope = self.seal(MessagePayload::StateXfer(xfer));
                let target = match &envelope.payload {
                    MessagePayload::StateXfer(x) => x.target,
                    _ => unreachable!(),
                };
                output.to_internal.push((InternalTarget::Unicast(target), envelope));
            }
            SmReply::Scada(scada) => {
                if !self.is_control_center() {
                    return (self, output);
                }
                let digest = tc_digest(o, &scada);
                let share = self
                    .keys
                    .threshold_share()
                    .expect("control-center replica must hold a threshold share key")
                    .sign_share(&digest);

                let envelope = self.seal(MessagePayload::TcShare {
                    ordinal: o,
                    payload: Box::new(scada.clone()),
                    share,
                });

                let local = self.local_replica_id;
                let (new_self, insert_output) = self.insert_tc_share(o, local, share, Some(scada));
                self = new_self;
                output.merge(insert_output);
                output.to_internal.push((InternalTarget::Broadcast, envelope));
            }
        }

        (self, output)
    }
}
