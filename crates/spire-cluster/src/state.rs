use spire_types::ReplicaId;
use spire_wire::{ConfigMessage, ReplicaType};

use crate::error::{ClusterError, Result};

/// The currently installed cluster configuration, plus the bookkeeping
/// needed to reject stale or undersized replacements (spec §4.5 steps 1-2).
#[derive(Debug, Clone)]
pub struct ClusterState {
    config: ConfigMessage,
}

impl ClusterState {
    pub fn new(config: ConfigMessage) -> Self {
        Self { config }
    }

    pub fn current(&self) -> &ConfigMessage {
        &self.config
    }

    pub fn global_configuration_number(&self) -> u32 {
        self.config.global_configuration_number
    }

    /// Validates and installs `new` (spec §4.5 steps 1-3). Returns the
    /// previous configuration on success so callers (the Master's
    /// `SYSTEM_RESET`-equivalent reset, spec §4.1/§4.5 step 6) can compare
    /// before/after states.
    pub fn apply(&mut self, new: ConfigMessage) -> Result<ConfigMessage> {
        if new.global_configuration_number <= self.config.global_configuration_number {
            return Err(ClusterError::StaleConfiguration {
                incoming: new.global_configuration_number,
                current: self.config.global_configuration_number,
            });
        }
        if !new.is_size_valid() {
            return Err(ClusterError::Undersized {
                n: new.n,
                required: 3 * new.f + 2 * new.k + 1,
            });
        }
        tracing::info!(
            old = self.config.global_configuration_number,
            new = new.global_configuration_number,
            "installing cluster reconfiguration"
        );
        Ok(std::mem::replace(&mut self.config, new))
    }

    pub fn is_member(&self, id: ReplicaId) -> bool {
        self.config.contains_replica(id)
    }

    pub fn replica_type(&self, id: ReplicaId) -> Option<ReplicaType> {
        self.config
            .slots
            .iter()
            .find(|s| s.replica_id() == Some(id))
            .map(|s| s.replica_type)
    }

    pub fn is_control_center(&self, id: ReplicaId) -> bool {
        matches!(self.replica_type(id), Some(ReplicaType::ControlCenter))
    }

    pub fn control_center_replicas(&self) -> Vec<ReplicaId> {
        self.config.control_center_replicas().collect()
    }

    pub fn required_shares(&self) -> usize {
        self.config.required_shares()
    }

    pub fn max_shares(&self) -> usize {
        self.config.max_shares()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_wire::ReplicaSlot;

    fn slot(id: u32, ty: ReplicaType) -> ReplicaSlot {
        ReplicaSlot {
            tpm_based_id: id,
            replica_type: ty,
            external_addr: format!("10.0.0.{id}:10000"),
            internal_addr: format!("10.0.1.{id}:11000"),
        }
    }

    fn config(gcn: u32) -> ConfigMessage {
        ConfigMessage {
            n: 6,
            f: 1,
            k: 1,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 1,
            slots: vec![
                slot(0, ReplicaType::ControlCenter),
                slot(1, ReplicaType::ControlCenter),
                slot(2, ReplicaType::ControlCenter),
                slot(3, ReplicaType::ControlCenter),
                slot(4, ReplicaType::DisasterRecovery),
                slot(5, ReplicaType::DisasterRecovery),
            ],
            global_configuration_number: gcn,
        }
    }

    #[test]
    fn apply_rejects_non_increasing_generation() {
        let mut state = ClusterState::new(config(5));
        let err = state.apply(config(5)).unwrap_err();
        assert!(matches!(err, ClusterError::StaleConfiguration { .. }));

        let err = state.apply(config(4)).unwrap_err();
        assert!(matches!(err, ClusterError::StaleConfiguration { .. }));
    }

    #[test]
    fn apply_rejects_undersized_cluster() {
        let mut state = ClusterState::new(config(1));
        let mut undersized = config(2);
        undersized.n = 3; // below 3f+2k+1 = 6
        let err = state.apply(undersized).unwrap_err();
        assert!(matches!(err, ClusterError::Undersized { .. }));
        // rejection keeps the current configuration installed
        assert_eq!(state.global_configuration_number(), 1);
    }

    #[test]
    fn apply_installs_and_returns_previous() {
        let mut state = ClusterState::new(config(1));
        let previous = state.apply(config(2)).unwrap();
        assert_eq!(previous.global_configuration_number, 1);
        assert_eq!(state.global_configuration_number(), 2);
    }

    #[test]
    fn membership_reflects_installed_slots() {
        let state = ClusterState::new(config(1));
        assert!(state.is_member(ReplicaId::new(3)));
        assert!(!state.is_member(ReplicaId::new(99)));
        assert!(state.is_control_center(ReplicaId::new(0)));
        assert!(!state.is_control_center(ReplicaId::new(4)));
        assert_eq!(state.required_shares(), 2);
    }
}
