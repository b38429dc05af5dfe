use spire_crypto::ThresholdShare;
use spire_types::{Ordinal, ReplicaId};
use spire_wire::{tc_digest, Envelope, MessagePayload, ScadaPayload, StateXferPayload};

use crate::output::ReplicationOutput;
use crate::queues::{StSnapshot, TcNode};
use crate::state::ReplicaState;

impl ReplicaState {
    /// spec §4.1 `on_internal_message`: an envelope arrived on the
    /// control-center-only internal overlay from another replica. Verified
    /// against the sender's own signing key before anything in it is acted
    /// on -- the internal overlay carries `TC_SHARE` and `STATE_XFER`
    /// traffic, both security-critical.
    pub fn on_internal_message(mut self, envelope: Envelope) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();
        let sender = envelope.machine_id;

        let verifying_key = match self.keys.verifying_key(sender) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(sender = %sender, error = %err, "no verifying key for internal sender");
                return (self, output);
            }
        };
        if let Err(err) = envelope.verify(verifying_key) {
            tracing::warn!(sender = %sender, error = %err, "internal message failed signature verification");
            return (self, output);
        }

        match envelope.payload {
            MessagePayload::TcShare { ordinal, payload, share } => {
                let (new_self, insert_output) = self.insert_tc_share(ordinal, sender, share, Some(*payload));
                self = new_self;
                output.merge(insert_output);
            }
            MessagePayload::StateXfer(xfer) => {
                let (new_self, insert_output) = self.insert_state_snapshot(sender, xfer);
                self = new_self;
                output.merge(insert_output);
            }
            other => {
                tracing::warn!(type = ?other.type_tag(), sender = %sender, "unexpected payload on internal overlay");
            }
        }

        (self, output)
    }

    fn insert_state_snapshot(mut self, sender: ReplicaId, xfer: StateXferPayload) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();
        let o = xfer.ordinal;
        let required = self.cluster.required_shares();

        let snapshot = StSnapshot {
            latest_update: xfer.latest_update,
            state: xfer.state,
        };
        let (became_collected, signaled) = {
            let node = self.st_queue.entry(o).or_default();
            (node.insert_snapshot(sender, snapshot, required), node.signaled)
        };

        if became_collected && signaled {
            let (new_self, apply_output) = self.apply_state_transfer(o);
            self = new_self;
            output.merge(apply_output);
        }

        (self, output)
    }

    /// spec §4.1 "TC-share insertion algorithm": records `share` from
    /// `sender` for ordinal `o`, and once this replica's own share is among
    /// `f+1` recorded for the ordinal, combines them into the final
    /// threshold signature. Used both for shares produced locally (spec
    /// `on_sm_reply`) and shares received over the internal overlay.
    pub(crate) fn insert_tc_share(
        mut self,
        o: Ordinal,
        sender: ReplicaId,
        share: ThresholdShare,
        payload: Option<ScadaPayload>,
    ) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        if o <= self.applied_ord {
            tracing::debug!(ordinal = %o, "dropping TC share at or before applied_ord");
            return (self, output);
        }

        {
            let node = self.tc_queue.entry(o).or_insert_with(TcNode::new);
            if node.done || node.has_share_from(sender) {
                return (self, output);
            }
            node.insert_share(sender, share);
            if payload.is_some() {
                node.payload = payload;
            }
        }

        let required = self.cluster.required_shares();
        let local = self.local_replica_id;
        let ready = {
            let node = &self.tc_queue[&o];
            !node.done && node.share_count() >= required && node.has_own_share(local) && node.payload.is_some()
        };

        if ready {
            let payload = self.tc_queue[&o].payload.clone().expect("checked above");
            let digest = tc_digest(o, &payload);
            let public = self.keys.threshold_public();
            if let Some(share_key) = self.keys.threshold_share() {
                let shares = self.tc_queue[&o].shares().clone();
                match share_key.combine(&digest, &shares, public, required) {
                    Ok(signature) => {
                        let node = self.tc_queue.get_mut(&o).expect("just checked above");
                        node.final_signature = Some(signature);
                        node.done = true;
                    }
                    Err(err) => {
                        tracing::debug!(ordinal = %o, error = %err, "not enough verifying shares yet");
                    }
                }
            }
        }

        let (new_self, drain_output) = self.drain_tc_queue();
        self = new_self;
        output.merge(drain_output);
        (self, output)
    }

    /// spec §4.1 "TC-queue drain algorithm": repeatedly emits the
    /// threshold-signed reply for the queue head while it is done and
    /// consecutive to `applied_ord`, advancing `applied_ord` past it.
    fn drain_tc_queue(mut self) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        loop {
            let Some((&head_ord, _)) = self.tc_queue.iter().next() else {
                break;
            };
            let ready = {
                let node = &self.tc_queue[&head_ord];
                node.done && self.applied_ord.is_consecutive(head_ord)
            };
            if !ready {
                break;
            }

            let node = self.tc_queue.remove(&head_ord).expect("head just checked");
            if !node.skip {
                if let (Some(payload), Some(signature)) = (node.payload, node.final_signature) {
                    let envelope = self.seal(MessagePayload::TcFinal {
                        ordinal: head_ord,
                        payload: Box::new(payload),
                        signature,
                    });
                    output.to_client.push(envelope);
                }
            }
            self.applied_ord = head_ord;
        }

        (self, output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spire_cluster::ClusterState;
    use spire_config::{KeyMaterial, Paths};
    use spire_types::{Ordinal, ReplicaId, SeqPair};
    use spire_wire::{BenchmarkPayload, ConfigMessage, ReplicaSlot, ReplicaType, ScadaPayload};

    use super::*;

    fn slot(id: u32) -> ReplicaSlot {
        ReplicaSlot {
            tpm_based_id: id,
            replica_type: ReplicaType::ControlCenter,
            external_addr: format!("127.0.0.1:{}", 10000 + id),
            internal_addr: format!("127.0.0.1:{}", 11000 + id),
        }
    }

    fn config() -> ConfigMessage {
        ConfigMessage {
            n: 4,
            f: 1,
            k: 0,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 0,
            slots: (0..4).map(slot).collect(),
            global_configuration_number: 1,
        }
    }

    fn keys_for(id: u32, dir: &std::path::Path) -> KeyMaterial {
        let paths = Paths::new(dir);
        for i in 0..4 {
            KeyMaterial::generate_for_test(&paths, ReplicaId::new(i), true, [11u8; 32]).unwrap();
        }
        let cluster = ClusterState::new(config());
        KeyMaterial::load_replica(&paths, ReplicaId::new(id), &cluster).unwrap()
    }

    fn scada() -> ScadaPayload {
        ScadaPayload::Benchmark(BenchmarkPayload {
            seq: SeqPair::new(1, 1),
            ping_sec: 0,
            ping_usec: 0,
            pong_sec: 0,
            pong_usec: 0,
        })
    }

    #[test]
    fn combines_once_own_plus_required_shares_are_present() {
        let dir = tempfile::tempdir().unwrap();
        let keys = keys_for(0, dir.path());
        let replica = ReplicaState::new(ReplicaId::new(0), 0, 1, ClusterState::new(config()), Arc::new(keys));

        let o = Ordinal::new(1, 1, 1);
        let payload = scada();
        let digest = tc_digest(o, &payload);

        let local_share = replica.keys.threshold_share().unwrap().sign_share(&digest);
        let (replica, _) = replica.insert_tc_share(o, ReplicaId::new(0), local_share, Some(payload.clone()));

        let peer_share = replica.keys.threshold_share().unwrap().sign_share(&digest);
        let (replica, output) = replica.insert_tc_share(o, ReplicaId::new(1), peer_share, None);

        assert_eq!(replica.applied_ord(), o);
        assert_eq!(output.to_client.len(), 1);
        assert!(matches!(output.to_client[0].payload, MessagePayload::TcFinal { .. }));
    }

    #[test]
    fn share_at_or_before_applied_ord_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let keys = keys_for(0, dir.path());
        let mut replica = ReplicaState::new(ReplicaId::new(0), 0, 1, ClusterState::new(config()), Arc::new(keys));
        replica.applied_ord = Ordinal::new(5, 1, 1);

        let o = Ordinal::new(3, 1, 1);
        let share = replica.keys.threshold_share().unwrap().sign_share(b"digest");
        let (replica, output) = replica.insert_tc_share(o, ReplicaId::new(1), share, Some(scada()));
        assert!(!replica.tc_queue.contains_key(&o));
        assert!(output.is_empty());
    }

    #[test]
    fn duplicate_share_from_same_sender_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let keys = keys_for(0, dir.path());
        let replica = ReplicaState::new(ReplicaId::new(0), 0, 1, ClusterState::new(config()), Arc::new(keys));

        let o = Ordinal::new(1, 1, 1);
        let digest = tc_digest(o, &scada());
        let share = replica.keys.threshold_share().unwrap().sign_share(&digest);

        let (replica, _) = replica.insert_tc_share(o, ReplicaId::new(1), share, Some(scada()));
        let count_before = replica.tc_queue[&o].share_count();
        let (replica, _) = replica.insert_tc_share(o, ReplicaId::new(1), share, Some(scada()));
        assert_eq!(replica.tc_queue[&o].share_count(), count_before);
    }
}
