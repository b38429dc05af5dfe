use spire_types::Ordinal;
use spire_wire::{MessagePayload, StateXferPayload};

use crate::output::ReplicationOutput;
use crate::state::ReplicaState;

impl ReplicaState {
    /// spec §4.1 "State-transfer application": a quorum of identical
    /// snapshots has been agreed at ordinal `o`. Jumps the replica's
    /// progress directly to `o`, discarding every TC/ST node at or before it
    /// -- they covered ordinals the snapshot already subsumes -- and hands
    /// the agreed state to the local state machine.
    pub(crate) fn apply_state_transfer(mut self, o: Ordinal) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        let Some(agreed) = self.st_queue.get(&o).and_then(|node| node.agreed.clone()) else {
            tracing::warn!(ordinal = %o, "apply_state_transfer called before a quorum agreed");
            return (self, output);
        };

        self.st_queue.retain(|ordinal, _| *ordinal > o);
        self.tc_queue.retain(|ordinal, _| *ordinal > o);
        self.ord_queue.retain(|ordinal| *ordinal > o);

        self.progress.install_snapshot(&agreed.latest_update);
        output.to_state_machine.push(MessagePayload::StateXfer(StateXferPayload {
            ordinal: o,
            target: self.local_replica_id,
            latest_update: agreed.latest_update,
            state: agreed.state,
        }));

        self.applied_ord = o;
        self.recvd_ord = self.recvd_ord.max(o);
        self.collecting_signal = false;
        self.completed_transfer = true;

        (self, output)
    }
}
