//! Overlay socket lifecycle (spec §9 Design Note: "explicit
//! `Disconnected | Connecting | Connected(handle)` state replaces an
//! implicit reconnect flag").
//!
//! `OverlaySocket` models the one link that genuinely goes up and down in
//! this design -- the point-to-point connection from Master or Inject to
//! Prime -- behind the three-state model and a fixed retry timer;
//! [`PrimeLink`] adapts it to [`IpcChannel`]. The control-center internal
//! overlay is a different shape: every replica sends to and receives from
//! every peer on one advertised port, so [`InternalOverlay`] multiplexes a
//! single bound socket over a peer address table instead of holding one
//! connection per peer.

use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;
use std::time::Instant;

use spire_types::{ReplicaId, RECONNECT_RETRY};

use crate::ipc::IpcChannel;

/// Lifecycle of one overlay peer connection.
#[derive(Debug)]
pub enum OverlayState {
    /// No socket bound; `next_attempt` gates when `poll` should try again.
    Disconnected { next_attempt: Instant },
    /// A socket exists but the peer address has not yet accepted traffic
    /// (UDP has no handshake, so this state is transient: it exists only to
    /// make `poll`'s "just tried, don't retry immediately" bookkeeping
    /// explicit rather than encoded in a boolean flag).
    Connecting { socket: UdpSocket, since: Instant },
    Connected { socket: UdpSocket },
}

/// A single overlay peer, tracked through its connect/retry lifecycle.
pub struct OverlaySocket {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    state: OverlayState,
}

impl OverlaySocket {
    pub fn new(local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            peer_addr,
            state: OverlayState::Disconnected { next_attempt: Instant::now() },
        }
    }

    /// Advances the connection attempt if one is due. Called from the
    /// owning thread's readiness-wait loop (spec §5 "single readiness
    /// multiplexer"); never blocks.
    pub fn poll(&mut self) -> io::Result<()> {
        if let OverlayState::Disconnected { next_attempt } = &self.state {
            if Instant::now() < *next_attempt {
                return Ok(());
            }
            match self.bind_and_connect() {
                Ok(socket) => {
                    self.state = OverlayState::Connected { socket };
                }
                Err(err) => {
                    self.state = OverlayState::Disconnected { next_attempt: Instant::now() + RECONNECT_RETRY };
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn bind_and_connect(&self) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind(self.local_addr)?;
        socket.connect(self.peer_addr)?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, OverlayState::Connected { .. })
    }

    /// Sends `frame` if connected; silently drops it otherwise (spec §5:
    /// overlay traffic is best-effort, redelivery is Prime's concern).
    pub fn send(&mut self, frame: &[u8]) {
        if let OverlayState::Connected { socket } = &self.state {
            if let Err(err) = socket.send(frame) {
                tracing::debug!(peer = %self.peer_addr, error = %err, "overlay send failed, will retry on next poll");
                self.disconnect();
            }
        }
    }

    /// Non-blocking receive of the next datagram, or `None` if nothing is
    /// pending or the socket is not yet connected.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        let OverlayState::Connected { socket } = &self.state else {
            return None;
        };
        let mut buf = vec![0u8; crate::ipc::MAX_FRAME];
        match socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => None,
            Err(err) => {
                tracing::debug!(peer = %self.peer_addr, error = %err, "overlay recv failed, will retry on next poll");
                self.disconnect();
                None
            }
        }
    }

    /// Tears the socket down and schedules a reconnect attempt
    /// `RECONNECT_RETRY` from now (spec §4.5 step 5, spec §9 Design Note).
    pub fn disconnect(&mut self) {
        self.state = OverlayState::Disconnected { next_attempt: Instant::now() + RECONNECT_RETRY };
    }

    /// Rebinds to a new peer address after a reconfiguration (spec §4.5
    /// step 5): the old socket is dropped and a fresh connect attempt is
    /// scheduled immediately.
    pub fn reconfigure(&mut self, local_addr: SocketAddr, peer_addr: SocketAddr) {
        self.local_addr = local_addr;
        self.peer_addr = peer_addr;
        self.state = OverlayState::Disconnected { next_attempt: Instant::now() };
    }
}

/// Adapts [`OverlaySocket`]'s reconnect-on-demand behavior to the
/// [`IpcChannel`] trait (`&self` send/recv) via interior mutability --
/// Master and Inject each own exactly one `PrimeLink`, so the lock is
/// always uncontended.
pub struct PrimeLink {
    inner: Mutex<OverlaySocket>,
}

impl PrimeLink {
    pub fn new(local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            inner: Mutex::new(OverlaySocket::new(local_addr, peer_addr)),
        }
    }
}

impl IpcChannel for PrimeLink {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().expect("prime link mutex is never poisoned");
        inner.poll().ok();
        inner.send(frame);
        Ok(())
    }

    fn try_recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().expect("prime link mutex is never poisoned");
        inner.poll().ok();
        Ok(inner.try_recv())
    }
}

/// The control-center-only internal overlay (spec §4.1 `on_sm_reply`:
/// "broadcast to all other control-center replicas"): one non-blocking UDP
/// socket bound to this replica's advertised internal address, a table of
/// peer addresses keyed by [`ReplicaId`], and plain `send_to`/`recv_from`
/// rather than a connection per peer.
pub struct InternalOverlay {
    socket: UdpSocket,
    peers: BTreeMap<ReplicaId, SocketAddr>,
}

impl InternalOverlay {
    pub fn bind(local_addr: SocketAddr, peers: BTreeMap<ReplicaId, SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(local_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, peers })
    }

    pub fn send_to(&self, id: ReplicaId, frame: &[u8]) {
        match self.peers.get(&id) {
            Some(addr) => {
                if let Err(err) = self.socket.send_to(frame, addr) {
                    tracing::debug!(peer = %id, error = %err, "internal overlay send failed");
                }
            }
            None => tracing::warn!(peer = %id, "no known internal overlay address for peer"),
        }
    }

    pub fn broadcast(&self, frame: &[u8]) {
        for (id, addr) in &self.peers {
            if let Err(err) = self.socket.send_to(frame, addr) {
                tracing::debug!(peer = %id, error = %err, "internal overlay broadcast send failed");
            }
        }
    }

    /// Non-blocking receive of the next datagram, from whichever peer sent
    /// it; the sender's identity is read out of the signed envelope itself
    /// rather than the socket address; see spec §4.1 `on_internal_message`.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; crate::ipc::MAX_FRAME];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _from)) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => None,
            Err(err) => {
                tracing::debug!(error = %err, "internal overlay recv failed");
                None
            }
        }
    }

    /// Rebinds to this replica's new internal address and peer table after
    /// a reconfiguration (spec §4.5 step 5).
    pub fn reconfigure(&mut self, local_addr: SocketAddr, peers: BTreeMap<ReplicaId, SocketAddr>) -> io::Result<()> {
        let socket = UdpSocket::bind(local_addr)?;
        socket.set_nonblocking(true)?;
        self.socket = socket;
        self.peers = peers;
        Ok(())
    }
}
