//! ITRC-Master and ITRC-Inject replica processes: thread-per-role runtime,
//! IPC, and overlay sockets (spec §5 "Concurrency & resource model").
//!
//! This crate is the imperative shell: it owns every OS resource (sockets,
//! threads, queues) and drives `spire_replication::ReplicaState` through its
//! pure `on_*` transitions, executing the `ReplicationOutput` each one
//! returns. `spire-node` wires a `ReplicaRuntime` up from on-disk
//! configuration and key material; this crate only knows how to run one,
//! given already-loaded inputs.

mod barrier;
mod error;
mod inject;
mod ipc;
mod master;
mod overlay;
mod queue;
mod shutdown;

use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use spire_cluster::ClusterState;
use spire_config::KeyMaterial;
use spire_replication::ReplicaState;
use spire_types::ReplicaId;

pub use barrier::StartupBarrier;
pub use error::{ServerError, ServerResult};
pub use inject::Inject;
pub use ipc::{InMemoryChannel, IpcChannel, UnixDatagramChannel};
pub use master::Master;
pub use overlay::{InternalOverlay, OverlaySocket, PrimeLink};
pub use queue::{BoundedQueue, PushResult};
pub use shutdown::ShutdownToken;

/// Everything `spire-node`'s `server` subcommand has parsed or resolved
/// before a replica can start: identity, addresses, and the two local IPC
/// socket paths (spec §6 "External interfaces").
pub struct ReplicaRuntimeConfig {
    pub replica_id: ReplicaId,
    pub site_id: u32,
    pub incarnation: u32,

    /// Local bind address for the Master thread's Prime link.
    pub master_prime_local: SocketAddr,
    /// Address Prime listens on for Master's ordered-output stream.
    pub master_prime_peer: SocketAddr,
    /// Local bind address for the Inject thread's Prime link.
    pub inject_prime_local: SocketAddr,
    /// Address Prime listens on for Inject's client-forwarded updates.
    pub inject_prime_peer: SocketAddr,

    /// This replica's advertised internal overlay address (spec §4.1,
    /// control-center mesh); ignored for disaster-recovery replicas, which
    /// have no internal overlay.
    pub internal_local: SocketAddr,
    /// This replica's advertised external overlay address, where clients
    /// submit updates (spec §4.2).
    pub external_local: SocketAddr,
    /// Multicast group `to_client` replies are sent to (spec §4.3: clients
    /// self-select on `client_idx` after receiving).
    pub client_mcast_addr: SocketAddr,

    pub sm_socket_path: std::path::PathBuf,
    pub sm_peer_socket_path: std::path::PathBuf,
    pub config_agent_socket_path: std::path::PathBuf,
    pub config_agent_peer_socket_path: std::path::PathBuf,

    /// Key directory this replica's key material was loaded from at
    /// start-up; reused by `Master` to reload keys under the same layout
    /// once a reconfiguration lands (spec §4.5 step 4).
    pub key_dir: std::path::PathBuf,

    pub queue_capacity: usize,
}

/// A running replica: the Master and Inject threads, plus the handle needed
/// to stop them (spec §9 Design Note: "structured shutdown").
pub struct ReplicaRuntime {
    shutdown: ShutdownToken,
    master_handle: Option<JoinHandle<()>>,
    inject_handle: Option<JoinHandle<()>>,
}

impl ReplicaRuntime {
    /// `cluster` and `keys` are the already-resolved start-up configuration
    /// -- the caller loaded them once before the replica existed. From here
    /// on, the Master thread owns reloading both under the layout named by
    /// `cfg.key_dir` whenever a reconfiguration lands (spec §4.5 step 4).
    /// Spawns the Master and Inject threads, blocking until both have
    /// cleared the startup barrier (spec §5: "no client update is accepted
    /// before the TC/State queues and the Prime IPC are usable").
    pub fn start(cfg: ReplicaRuntimeConfig, cluster: ClusterState, keys: Arc<KeyMaterial>) -> ServerResult<Self> {
        let shutdown = ShutdownToken::new();
        let barrier = StartupBarrier::new();

        let internal_peers = internal_peer_table(cluster.current(), cfg.replica_id);

        let state = ReplicaState::new(cfg.replica_id, cfg.site_id, cfg.incarnation, cluster, keys.clone());
        let shared_config = Arc::new(Mutex::new(state.current_config().clone()));
        let inject_signals = Arc::new(BoundedQueue::new(cfg.queue_capacity));

        let master_prime = PrimeLink::new(cfg.master_prime_local, cfg.master_prime_peer);
        let sm = UnixDatagramChannel::bind_and_connect(&cfg.sm_socket_path, &cfg.sm_peer_socket_path)
            .map_err(|err| ServerError::Fatal(format!("failed to bind state-machine IPC socket: {err}")))?;
        let config_agent = UnixDatagramChannel::bind_and_connect(&cfg.config_agent_socket_path, &cfg.config_agent_peer_socket_path)
            .map_err(|err| ServerError::Fatal(format!("failed to bind config-agent IPC socket: {err}")))?;
        let internal = InternalOverlay::bind(cfg.internal_local, internal_peers)
            .map_err(|err| ServerError::Fatal(format!("failed to bind internal overlay socket: {err}")))?;
        let client_reply = UdpSocket::bind("0.0.0.0:0")
            .map_err(|err| ServerError::Fatal(format!("failed to bind client reply socket: {err}")))?;

        let paths = spire_config::Paths::new(cfg.key_dir.clone());

        let master = Master::new(
            state,
            master_prime,
            sm,
            config_agent,
            internal,
            client_reply,
            cfg.client_mcast_addr,
            Arc::clone(&inject_signals),
            Arc::clone(&shared_config),
            paths.clone(),
            shutdown.clone(),
            barrier.clone(),
        );

        let inject_prime = PrimeLink::new(cfg.inject_prime_local, cfg.inject_prime_peer);
        let external = UdpSocket::bind(cfg.external_local)
            .map_err(|err| ServerError::Fatal(format!("failed to bind external overlay socket: {err}")))?;
        let inject = Inject::new(
            cfg.replica_id,
            cfg.site_id,
            cfg.incarnation,
            keys,
            shared_config,
            paths,
            external,
            inject_prime,
            inject_signals,
            shutdown.clone(),
            barrier,
        );

        let master_handle = thread::Builder::new()
            .name("spire-master".to_string())
            .spawn(move || master.run())
            .map_err(|err| ServerError::Fatal(format!("failed to spawn Master thread: {err}")))?;
        let inject_handle = thread::Builder::new()
            .name("spire-inject".to_string())
            .spawn(move || inject.run())
            .map_err(|err| ServerError::Fatal(format!("failed to spawn Inject thread: {err}")))?;

        Ok(Self {
            shutdown,
            master_handle: Some(master_handle),
            inject_handle: Some(inject_handle),
        })
    }

    /// Signals both threads to stop and waits for them to exit (spec §9
    /// Design Note: "structured shutdown replaces signal-handler cleanup").
    pub fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.master_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.inject_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Builds the peer address table `InternalOverlay` needs from the loaded
/// configuration: every other control-center replica's internal address,
/// keyed by id (spec §4.1: "broadcast to all other control-center
/// replicas").
fn internal_peer_table(config: &spire_wire::ConfigMessage, local: ReplicaId) -> BTreeMap<ReplicaId, SocketAddr> {
    let mut peers = BTreeMap::new();
    for slot in &config.slots {
        let Some(id) = slot.replica_id() else { continue };
        if id == local || !matches!(slot.replica_type, spire_wire::ReplicaType::ControlCenter) {
            continue;
        }
        match slot.internal_addr.parse() {
            Ok(addr) => {
                peers.insert(id, addr);
            }
            Err(err) => tracing::warn!(peer = %id, addr = %slot.internal_addr, error = %err, "malformed internal overlay address, skipping peer"),
        }
    }
    peers
}
