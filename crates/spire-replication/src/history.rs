use spire_types::{ClientIdx, Ordinal, SeqPair, HISTORY_SLOTS};
use spire_wire::ScadaPayload;

/// The last payload applied for each client index, plus the ordinal at
/// which it was applied (spec §3 `UpdateHistory`). Fixed-size, indexed by
/// `ClientIdx`, matching the `MAX_EMU_RTU + NUM_HMI + 1`-slot table the
/// payload-to-index mapping in `spire-wire` assumes.
#[derive(Debug, Clone)]
pub struct UpdateHistory {
    slots: Vec<Option<(Ordinal, ScadaPayload)>>,
}

impl Default for UpdateHistory {
    fn default() -> Self {
        Self {
            slots: vec![None; HISTORY_SLOTS as usize],
        }
    }
}

impl UpdateHistory {
    pub fn get(&self, idx: ClientIdx) -> Option<&(Ordinal, ScadaPayload)> {
        self.slots.get(idx.as_usize()).and_then(|s| s.as_ref())
    }

    pub fn set(&mut self, idx: ClientIdx, ordinal: Ordinal, payload: ScadaPayload) {
        if let Some(slot) = self.slots.get_mut(idx.as_usize()) {
            *slot = Some((ordinal, payload));
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

/// `progress[client_idx]`: the last accepted `SeqPair` per client, used to
/// detect and drop duplicate updates (spec §4.1).
#[derive(Debug, Clone)]
pub struct Progress {
    slots: Vec<SeqPair>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            slots: vec![SeqPair::ZERO; HISTORY_SLOTS as usize],
        }
    }
}

impl Progress {
    pub fn get(&self, idx: ClientIdx) -> SeqPair {
        self.slots.get(idx.as_usize()).copied().unwrap_or(SeqPair::ZERO)
    }

    pub fn set(&mut self, idx: ClientIdx, seq: SeqPair) {
        if let Some(slot) = self.slots.get_mut(idx.as_usize()) {
            *slot = seq;
        }
    }

    /// Is `seq` new for this client (spec §4.1: "compare `seq_pair` against
    /// `progress[client_idx]`")? Anything not strictly greater is a
    /// duplicate -- stale or replayed -- and gets skipped rather than
    /// re-applied.
    pub fn is_new(&self, idx: ClientIdx, seq: SeqPair) -> bool {
        seq > self.get(idx)
    }

    /// Bulk-installs a state-transfer snapshot's `latest_update` vector
    /// (spec §4.1 "State-transfer application" step 3). Snapshots are
    /// dense, ordered by client index starting at zero.
    pub fn install_snapshot(&mut self, latest_update: &[SeqPair]) {
        for (idx, seq) in latest_update.iter().enumerate() {
            if let Some(slot) = self.slots.get_mut(idx) {
                *slot = *seq;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<SeqPair> {
        self.slots.clone()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = SeqPair::ZERO);
    }
}
