use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use spire_cluster::ClusterState;
use spire_config::KeyMaterial;
use spire_types::{Ordinal, ReplicaId};
use spire_wire::{Envelope, MessagePayload};

use crate::history::{Progress, UpdateHistory};
use crate::queues::{StNode, TcNode};

/// The Master's in-memory state (spec §3, §9 Design Note: "group into a
/// `ReplicaState` owned by the Master task"). Every field here is touched
/// only by the Master thread (spec §5 "Shared resources").
#[derive(Debug)]
pub struct ReplicaState {
    pub(crate) local_replica_id: ReplicaId,
    pub(crate) site_id: u32,
    pub(crate) incarnation: u32,
    monotonic_counter: u32,

    pub(crate) cluster: ClusterState,
    pub(crate) keys: Arc<KeyMaterial>,

    pub(crate) recvd_ord: Ordinal,
    pub(crate) applied_ord: Ordinal,
    pub(crate) progress: Progress,
    pub(crate) up_hist: UpdateHistory,
    pub(crate) ord_queue: VecDeque<Ordinal>,
    pub(crate) tc_queue: BTreeMap<Ordinal, TcNode>,
    pub(crate) st_queue: BTreeMap<Ordinal, StNode>,

    pub(crate) collecting_signal: bool,
    pub(crate) completed_transfer: bool,
    /// Ordinals buffered while `collecting_signal` is set, paired with the
    /// raw payload `on_prime_ordered` received for them -- replayed through
    /// `on_prime_ordered` again once the state transfer they were waiting on
    /// completes (spec §9 Design Note, `take_completed_transfer`).
    pub(crate) pending_updates: Vec<(Ordinal, MessagePayload)>,

    /// `true` once `on_prime_ordered` has processed at least one ordinal --
    /// distinguishes "the very first ordinal received" (spec §4.1) from a
    /// later non-consecutive one.
    pub(crate) has_received_first_ordinal: bool,
}

impl ReplicaState {
    pub fn new(local_replica_id: ReplicaId, site_id: u32, incarnation: u32, cluster: ClusterState, keys: Arc<KeyMaterial>) -> Self {
        Self {
            local_replica_id,
            site_id,
            incarnation,
            monotonic_counter: 0,
            cluster,
            keys,
            recvd_ord: Ordinal::ZERO,
            applied_ord: Ordinal::ZERO,
            progress: Progress::default(),
            up_hist: UpdateHistory::default(),
            ord_queue: VecDeque::new(),
            tc_queue: BTreeMap::new(),
            st_queue: BTreeMap::new(),
            collecting_signal: false,
            completed_transfer: false,
            pending_updates: Vec::new(),
            has_received_first_ordinal: false,
        }
    }

    pub fn local_replica_id(&self) -> ReplicaId {
        self.local_replica_id
    }

    pub fn recvd_ord(&self) -> Ordinal {
        self.recvd_ord
    }

    pub fn applied_ord(&self) -> Ordinal {
        self.applied_ord
    }

    /// The currently installed cluster configuration, for callers (the
    /// Inject thread, via the Master's shared snapshot) that need to learn
    /// a replica's overlay addresses after a reconfiguration (spec §4.5
    /// step 5).
    pub fn current_config(&self) -> &spire_wire::ConfigMessage {
        self.cluster.current()
    }

    pub fn is_control_center(&self) -> bool {
        self.cluster.is_control_center(self.local_replica_id)
    }

    /// Installs freshly loaded key material, replacing whatever this
    /// replica started up with. The imperative shell calls this once it has
    /// reloaded `keys` from disk under a newly installed configuration
    /// (spec §4.5 step 4); `ReplicaState` itself never touches the
    /// filesystem.
    pub fn set_keys(&mut self, keys: Arc<KeyMaterial>) {
        self.keys = keys;
    }

    pub fn collecting_signal(&self) -> bool {
        self.collecting_signal
    }

    pub fn take_completed_transfer(&mut self) -> bool {
        std::mem::take(&mut self.completed_transfer)
    }

    /// Drains every ordinal buffered while waiting on a state transfer.
    /// Callers should have just observed [`Self::take_completed_transfer`]
    /// return `true`, then re-feed the entries with an ordinal strictly
    /// greater than `recvd_ord` back through `on_prime_ordered`.
    pub fn take_pending_updates(&mut self) -> Vec<(Ordinal, MessagePayload)> {
        std::mem::take(&mut self.pending_updates)
    }

    fn next_monotonic_counter(&mut self) -> u32 {
        self.monotonic_counter += 1;
        self.monotonic_counter
    }

    /// Wraps `payload` in a freshly signed envelope stamped with this
    /// replica's identity and the currently installed configuration number
    /// (spec §6 wire envelope layout).
    pub(crate) fn seal(&mut self, payload: MessagePayload) -> Envelope {
        let counter = self.next_monotonic_counter();
        Envelope::unsigned(
            self.site_id,
            self.local_replica_id,
            self.incarnation,
            counter,
            self.cluster.global_configuration_number(),
            payload,
        )
        .sign(self.keys.signing_key())
    }

    /// Resets all in-memory queues and progress to their startup state
    /// (spec §4.1 `SYSTEM_RESET`/`SYSTEM_RECONF` handling, §4.5 step 6).
    pub(crate) fn reset_queues(&mut self) {
        self.recvd_ord = Ordinal::ZERO;
        self.applied_ord = Ordinal::ZERO;
        self.progress.clear();
        self.up_hist.clear();
        self.ord_queue.clear();
        self.tc_queue.clear();
        self.st_queue.clear();
        self.collecting_signal = false;
        self.completed_transfer = false;
        self.pending_updates.clear();
        self.has_received_first_ordinal = false;
    }
}
