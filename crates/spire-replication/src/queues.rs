use std::collections::BTreeMap;

use spire_crypto::{ThresholdShare, ThresholdSignature};
use spire_types::ReplicaId;
use spire_wire::ScadaPayload;

/// One slot in the threshold-share queue (spec §3 `TcNode`). `shares`
/// doubles as the "received" bitmap -- a sender has a recorded share iff it
/// has a key in this map, so there is no separate bool table to keep in
/// sync.
#[derive(Debug, Clone)]
pub struct TcNode {
    pub payload: Option<ScadaPayload>,
    shares: BTreeMap<ReplicaId, ThresholdShare>,
    pub done: bool,
    pub skip: bool,
    pub final_signature: Option<ThresholdSignature>,
}

impl TcNode {
    pub fn new() -> Self {
        Self {
            payload: None,
            shares: BTreeMap::new(),
            done: false,
            skip: false,
            final_signature: None,
        }
    }

    pub fn skip() -> Self {
        Self {
            done: true,
            skip: true,
            ..Self::new()
        }
    }

    pub fn has_share_from(&self, sender: ReplicaId) -> bool {
        self.shares.contains_key(&sender)
    }

    pub fn insert_share(&mut self, sender: ReplicaId, share: ThresholdShare) {
        self.shares.insert(sender, share);
    }

    pub fn shares(&self) -> &BTreeMap<ReplicaId, ThresholdShare> {
        &self.shares
    }

    pub fn share_count(&self) -> usize {
        self.shares.len()
    }

    pub fn has_own_share(&self, local: ReplicaId) -> bool {
        self.shares.contains_key(&local)
    }
}

impl Default for TcNode {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot in the state-transfer queue (spec §3 `StNode`).
#[derive(Debug, Clone, Default)]
pub struct StNode {
    snapshots: BTreeMap<ReplicaId, StSnapshot>,
    pub collected: bool,
    pub signaled: bool,
    pub agreed: Option<StSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StSnapshot {
    pub latest_update: Vec<spire_types::SeqPair>,
    pub state: Vec<u8>,
}

impl StNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `snapshot` from `sender`, re-evaluating whether `f+1` of the
    /// recorded snapshots now agree byte-for-byte. Returns `true` if this
    /// insertion produced agreement for the first time.
    pub fn insert_snapshot(&mut self, sender: ReplicaId, snapshot: StSnapshot, required: usize) -> bool {
        self.snapshots.insert(sender, snapshot);
        if self.collected {
            return false;
        }
        let mut counts: BTreeMap<&StSnapshot, usize> = BTreeMap::new();
        for snap in self.snapshots.values() {
            *counts.entry(snap).or_insert(0) += 1;
        }
        if let Some((agreed, _)) = counts.into_iter().find(|(_, count)| *count >= required) {
            self.agreed = Some(agreed.clone());
            self.collected = true;
            return true;
        }
        false
    }
}

impl std::cmp::PartialOrd for StSnapshot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::cmp::Ord for StSnapshot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.latest_update, &self.state).cmp(&(&other.latest_update, &other.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_types::SeqPair;

    fn snap(byte: u8) -> StSnapshot {
        StSnapshot {
            latest_update: vec![SeqPair::ZERO],
            state: vec![byte],
        }
    }

    #[test]
    fn tc_node_tracks_received_senders_via_shares_map() {
        let mut node = TcNode::new();
        let replica = ReplicaId::new(1);
        assert!(!node.has_share_from(replica));

        let share = spire_crypto::ThresholdKeyShare::new(
            replica,
            spire_crypto::RsaSigningKey::generate(),
            spire_crypto::RsaSigningKey::generate(),
        )
        .sign_share(b"digest");
        node.insert_share(replica, share);
        assert!(node.has_share_from(replica));
        assert_eq!(node.share_count(), 1);
    }

    #[test]
    fn st_node_collects_once_quorum_agrees() {
        let mut node = StNode::new();
        assert!(!node.insert_snapshot(ReplicaId::new(0), snap(1), 2));
        assert!(!node.collected);
        assert!(node.insert_snapshot(ReplicaId::new(1), snap(1), 2));
        assert!(node.collected);
        assert_eq!(node.agreed.as_ref().unwrap().state, vec![1]);
    }

    #[test]
    fn st_node_ignores_disagreeing_snapshots() {
        let mut node = StNode::new();
        node.insert_snapshot(ReplicaId::new(0), snap(1), 2);
        let changed = node.insert_snapshot(ReplicaId::new(1), snap(2), 2);
        assert!(!changed);
        assert!(!node.collected);
    }
}
