//! The ITRC-Master thread: the imperative shell around
//! `spire_replication::ReplicaState` (spec §4.1, §5).
//!
//! Master owns the replication core and four I/O surfaces: the Prime IPC
//! channel (ordered payloads in, out-of-band config proposals out), the
//! local state-machine IPC channel (payloads out, replies in), the
//! config-agent IPC channel (proposals in), and the control-center-only
//! internal overlay (threshold shares and state snapshots, both
//! directions). `to_client` replies are carried to every client at once
//! over a UDP multicast group rather than fanned out per-client socket --
//! clients self-select on `client_idx` after receiving (spec §4.3) the way
//! they already do for the control-center's other broadcast traffic, so
//! Master does not need to track client return addresses.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spire_cluster::ClusterState;
use spire_config::{KeyMaterial, Paths};
use spire_replication::{InjectSignal, InternalTarget, ReplicaState, ReplicationOutput, SmReply};
use spire_wire::{ConfigMessage, Envelope, MessagePayload};

use crate::barrier::StartupBarrier;
use crate::ipc::IpcChannel;
use crate::overlay::InternalOverlay;
use crate::queue::{BoundedQueue, PushResult};
use crate::shutdown::ShutdownToken;

/// Readiness-wait poll interval (spec §9 Design Note: "single readiness
/// multiplexer" -- approximated here by a short sleep across all
/// non-blocking sources rather than a `mio::Poll` registry, see DESIGN.md).
const TICK_INTERVAL: Duration = Duration::from_millis(2);

pub struct Master<Prime, Sm, Agent> {
    state: Option<ReplicaState>,
    prime: Prime,
    sm: Sm,
    config_agent: Agent,
    internal: InternalOverlay,
    client_reply: UdpSocket,
    client_mcast_addr: SocketAddr,
    inject_signals: Arc<BoundedQueue<InjectSignal>>,
    /// Snapshot of the live configuration, refreshed whenever a
    /// reconfiguration lands, so the Inject thread can learn its new
    /// overlay addresses without sharing `ReplicaState` itself (spec §4.5
    /// step 5; spec §5 "Shared resources" keeps `ReplicaState` Master-only).
    shared_config: Arc<Mutex<ConfigMessage>>,
    /// Key directory this replica's key material was loaded from at
    /// start-up, reused to reload it under the same layout whenever a
    /// reconfiguration lands (spec §4.5 step 4).
    paths: Paths,
    shutdown: ShutdownToken,
    barrier: StartupBarrier,
}

impl<Prime, Sm, Agent> Master<Prime, Sm, Agent>
where
    Prime: IpcChannel,
    Sm: IpcChannel,
    Agent: IpcChannel,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: ReplicaState,
        prime: Prime,
        sm: Sm,
        config_agent: Agent,
        internal: InternalOverlay,
        client_reply: UdpSocket,
        client_mcast_addr: SocketAddr,
        inject_signals: Arc<BoundedQueue<InjectSignal>>,
        shared_config: Arc<Mutex<ConfigMessage>>,
        paths: Paths,
        shutdown: ShutdownToken,
        barrier: StartupBarrier,
    ) -> Self {
        client_reply.set_nonblocking(true).expect("client reply socket must support non-blocking mode");
        *shared_config.lock().expect("shared config mutex is never poisoned before start-up completes") =
            state.current_config().clone();
        Self {
            state: Some(state),
            prime,
            sm,
            config_agent,
            internal,
            client_reply,
            client_mcast_addr,
            inject_signals,
            shared_config,
            paths,
            shutdown,
            barrier,
        }
    }

    /// Runs the Master thread until `shutdown` is observed (spec §9 Design
    /// Note: "structured shutdown").
    pub fn run(mut self) {
        self.barrier.wait_for_inject(&self.shutdown);
        self.barrier.mark_master_ready();
        while !self.shutdown.is_cancelled() {
            self.tick();
            std::thread::sleep(TICK_INTERVAL);
        }
    }

    /// One pass over every input source. Exposed separately from `run` so
    /// tests can drive the loop deterministically instead of racing a
    /// background thread.
    pub fn tick(&mut self) {
        if let Ok(Some(bytes)) = self.prime.try_recv() {
            match postcard::from_bytes::<(spire_types::Ordinal, MessagePayload)>(&bytes) {
                Ok((ordinal, payload)) => self.apply(Box::new(|s| s.on_prime_ordered(ordinal, payload))),
                Err(err) => tracing::warn!(error = %err, "malformed frame from Prime, dropping"),
            }
        }

        if let Ok(Some(bytes)) = self.sm.try_recv() {
            match postcard::from_bytes::<SmReply>(&bytes) {
                Ok(reply) => self.apply(Box::new(|s| s.on_sm_reply(reply))),
                Err(err) => tracing::warn!(error = %err, "malformed reply from state machine, dropping"),
            }
        }

        if let Ok(Some(bytes)) = self.config_agent.try_recv() {
            match postcard::from_bytes::<ConfigMessage>(&bytes) {
                Ok(cfg) => self.apply(Box::new(|s| s.on_config_agent_message(cfg))),
                Err(err) => tracing::warn!(error = %err, "malformed proposal from config agent, dropping"),
            }
        }

        if let Some(bytes) = self.internal.try_recv() {
            match postcard::from_bytes::<Envelope>(&bytes) {
                Ok(envelope) => self.apply(Box::new(|s| s.on_internal_message(envelope))),
                Err(err) => tracing::warn!(error = %err, "malformed internal overlay frame, dropping"),
            }
        }
    }

    fn apply(&mut self, f: Box<dyn FnOnce(ReplicaState) -> (ReplicaState, ReplicationOutput) + '_>) {
        let state = self.state.take().expect("state is always restored before the next apply");
        let (mut new_state, output) = f(state);
        if output.to_inject.contains(&InjectSignal::ReconfigurationApplied) {
            *self.shared_config.lock().expect("shared config mutex is never poisoned") = new_state.current_config().clone();
            self.reload_keys(&mut new_state);
        }

        // spec.md §9 Design Note / §8 scenario 4: once a state transfer
        // lands, replay every ordinal buffered while it was pending -- Prime
        // never resends them, so they only exist here.
        let replay = new_state.take_completed_transfer().then(|| {
            let recvd = new_state.recvd_ord();
            new_state
                .take_pending_updates()
                .into_iter()
                .filter(|(ordinal, _)| *ordinal > recvd)
                .collect::<Vec<_>>()
        });

        self.state = Some(new_state);
        self.execute(output);

        if let Some(buffered) = replay {
            for (ordinal, payload) in buffered {
                self.apply(Box::new(|s| s.on_prime_ordered(ordinal, payload)));
            }
        }
    }

    /// Re-reads this replica's own signing key, every verifying key, and
    /// (if still a control-center member) its threshold share under the
    /// configuration `state` just installed (spec §4.5 step 4: "Reload
    /// RSA private/public keys and threshold private/public shares from
    /// the new key directory"). The key directory itself is the same one
    /// this replica started up with -- reconfiguration rotates who is
    /// provisioned under it, not its path.
    fn reload_keys(&self, state: &mut ReplicaState) {
        let cluster = ClusterState::new(state.current_config().clone());
        match KeyMaterial::load_replica(&self.paths, state.local_replica_id(), &cluster) {
            Ok(keys) => state.set_keys(Arc::new(keys)),
            Err(err) => tracing::error!(error = %err, "failed to reload key material after reconfiguration"),
        }
    }

    fn execute(&mut self, output: ReplicationOutput) {
        for payload in output.to_state_machine {
            self.send_framed(&self.sm, &payload, "state machine");
        }

        for signal in output.to_inject {
            if let PushResult::Backpressure(_) = self.inject_signals.try_push(signal) {
                tracing::warn!(?signal, "inject signal queue full, dropping signal");
            }
        }

        for (target, envelope) in output.to_internal {
            let Ok(bytes) = postcard::to_allocvec(&envelope) else {
                tracing::warn!("failed to encode internal overlay envelope");
                continue;
            };
            match target {
                InternalTarget::Broadcast => self.internal.broadcast(&bytes),
                InternalTarget::Unicast(id) => self.internal.send_to(id, &bytes),
            }
        }

        for envelope in output.to_client {
            match postcard::to_allocvec(&envelope) {
                Ok(bytes) => {
                    if let Err(err) = self.client_reply.send_to(&bytes, self.client_mcast_addr) {
                        tracing::debug!(error = %err, "client reply multicast send failed");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to encode client reply envelope"),
            }
        }

        for envelope in output.to_prime {
            self.send_framed(&self.prime, &envelope, "Prime");
        }
    }

    fn send_framed<T: serde::Serialize>(&self, channel: &impl IpcChannel, value: &T, dest: &str) {
        match postcard::to_allocvec(value) {
            Ok(bytes) => {
                if let Err(err) = channel.send(&bytes) {
                    tracing::debug!(dest, error = %err, "ipc send failed");
                }
            }
            Err(err) => tracing::warn!(dest, error = %err, "failed to encode frame"),
        }
    }
}
