use spire_wire::{ConfigMessage, MessagePayload};

use crate::output::ReplicationOutput;
use crate::state::ReplicaState;

impl ReplicaState {
    /// spec §4.1 `on_config_agent_message` / §4.5 step 1: a locally trusted
    /// configuration agent has proposed `cfg`. The Master never installs a
    /// configuration directly -- it forwards the proposal through Prime so
    /// every replica observes the switch at the same ordinal, and installs
    /// it only once that ordinal comes back around through
    /// `on_prime_ordered` as `PRIME_SYSTEM_RECONF` (spec §4.5 steps 2-3).
    pub fn on_config_agent_message(mut self, cfg: ConfigMessage) -> (Self, ReplicationOutput) {
        let mut output = ReplicationOutput::empty();

        if cfg.global_configuration_number <= self.cluster.global_configuration_number() {
            tracing::warn!(
                incoming = cfg.global_configuration_number,
                current = self.cluster.global_configuration_number(),
                "rejecting stale reconfiguration proposal"
            );
            return (self, output);
        }

        let envelope = self.seal(MessagePayload::PrimeOobConfigMsg(cfg));
        output.to_prime.push(envelope);
        (self, output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spire_cluster::ClusterState;
    use spire_types::ReplicaId;
    use spire_wire::ReplicaSlot;
    use spire_wire::ReplicaType;

    use super::*;
    use crate::state::ReplicaState;
    use spire_config::KeyMaterial;

    fn slot(id: u32) -> ReplicaSlot {
        ReplicaSlot {
            tpm_based_id: id,
            replica_type: ReplicaType::ControlCenter,
            external_addr: format!("127.0.0.1:{}", 10000 + id),
            internal_addr: format!("127.0.0.1:{}", 11000 + id),
        }
    }

    fn config(gcn: u32) -> ConfigMessage {
        ConfigMessage {
            n: 4,
            f: 1,
            k: 0,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 0,
            slots: (0..4).map(slot).collect(),
            global_configuration_number: gcn,
        }
    }

    fn state(gcn: u32) -> ReplicaState {
        let dir = tempfile::tempdir().unwrap();
        let paths = spire_config::Paths::new(dir.path());
        for id in 0..4 {
            KeyMaterial::generate_for_test(&paths, ReplicaId::new(id), true, [9u8; 32]).unwrap();
        }
        let cluster = ClusterState::new(config(gcn));
        let keys = KeyMaterial::load_replica(&paths, ReplicaId::new(0), &cluster).unwrap();
        ReplicaState::new(ReplicaId::new(0), 0, 1, cluster, Arc::new(keys))
    }

    #[test]
    fn stale_proposal_is_rejected_without_forwarding() {
        let replica = state(5);
        let (_, output) = replica.on_config_agent_message(config(5));
        assert!(output.to_prime.is_empty());
    }

    #[test]
    fn fresh_proposal_is_sealed_and_forwarded_to_prime() {
        let replica = state(5);
        let (_, output) = replica.on_config_agent_message(config(6));
        assert_eq!(output.to_prime.len(), 1);
        assert!(matches!(output.to_prime[0].payload, MessagePayload::PrimeOobConfigMsg(_)));
    }
}
