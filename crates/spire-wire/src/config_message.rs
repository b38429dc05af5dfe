use serde::{Deserialize, Serialize};
use spire_types::ReplicaId;

/// One slot in a [`ConfigMessage`]'s replica table. `tpm_based_id == 0`
/// denotes an empty slot (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaType {
    Empty,
    ControlCenter,
    DisasterRecovery,
}

/// A single populated (or empty) slot of the new cluster description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSlot {
    pub tpm_based_id: u32,
    pub replica_type: ReplicaType,
    pub external_addr: String,
    pub internal_addr: String,
}

impl ReplicaSlot {
    pub fn empty() -> Self {
        Self {
            tpm_based_id: 0,
            replica_type: ReplicaType::Empty,
            external_addr: String::new(),
            internal_addr: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tpm_based_id == 0
    }

    pub fn replica_id(&self) -> Option<ReplicaId> {
        (!self.is_empty()).then(|| ReplicaId::new(self.tpm_based_id))
    }
}

/// The new cluster description carried by `PRIME_OOB_CONFIG_MSG` /
/// `PRIME_SYSTEM_RECONF` (spec §3 `ConfigMessage`, §4.5 Reconfiguration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMessage {
    pub n: u32,
    pub f: u32,
    pub k: u32,
    pub num_cc_replicas: u32,
    pub num_cc_sites: u32,
    pub num_dc_sites: u32,
    pub slots: Vec<ReplicaSlot>,
    pub global_configuration_number: u32,
}

impl ConfigMessage {
    /// Spec §4.5 step 2: `N >= 3f + 2k + 1`.
    pub fn is_size_valid(&self) -> bool {
        self.n >= 3 * self.f + 2 * self.k + 1
    }

    pub fn required_shares(&self) -> usize {
        self.f as usize + 1
    }

    pub fn max_shares(&self) -> usize {
        (3 * self.f + 2 * self.k + 1) as usize
    }

    pub fn control_center_replicas(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.slots.iter().filter_map(|s| {
            (matches!(s.replica_type, ReplicaType::ControlCenter)).then(|| s.replica_id()).flatten()
        })
    }

    pub fn contains_replica(&self, id: ReplicaId) -> bool {
        self.slots.iter().any(|s| s.replica_id() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u32, ty: ReplicaType) -> ReplicaSlot {
        ReplicaSlot {
            tpm_based_id: id,
            replica_type: ty,
            external_addr: format!("10.0.0.{id}:10000"),
            internal_addr: format!("10.0.1.{id}:11000"),
        }
    }

    #[test]
    fn size_validity_matches_byzantine_bound() {
        let cfg = ConfigMessage {
            n: 6,
            f: 1,
            k: 1,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 1,
            slots: vec![],
            global_configuration_number: 1,
        };
        assert!(cfg.is_size_valid()); // 3*1 + 2*1 + 1 = 6
        assert_eq!(cfg.required_shares(), 2);
        assert_eq!(cfg.max_shares(), 6);
    }

    #[test]
    fn undersized_cluster_is_rejected() {
        let cfg = ConfigMessage {
            n: 5,
            f: 1,
            k: 1,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 1,
            slots: vec![],
            global_configuration_number: 1,
        };
        assert!(!cfg.is_size_valid());
    }

    #[test]
    fn control_center_replicas_excludes_empty_and_dc_slots() {
        let cfg = ConfigMessage {
            n: 6,
            f: 1,
            k: 1,
            num_cc_replicas: 2,
            num_cc_sites: 1,
            num_dc_sites: 1,
            slots: vec![
                slot(1, ReplicaType::ControlCenter),
                slot(2, ReplicaType::ControlCenter),
                ReplicaSlot::empty(),
                slot(3, ReplicaType::DisasterRecovery),
            ],
            global_configuration_number: 1,
        };
        let cc: Vec<_> = cfg.control_center_replicas().collect();
        assert_eq!(cc, vec![ReplicaId::new(1), ReplicaId::new(2)]);
        assert!(cfg.contains_replica(ReplicaId::new(3)));
        assert!(!cfg.contains_replica(ReplicaId::new(99)));
    }
}
