//! IPC between the Master and Inject threads and the co-located Prime /
//! state-machine processes (spec §6 "External Interfaces",
//! "IPC is modelled as a trait").
//!
//! Production replicas exchange postcard-framed datagrams over
//! `UnixDatagram` sockets, one per logical channel (Prime in/out, SM
//! in/out, Inject signal). Tests substitute an in-memory channel so the
//! Master/Inject control flow can be driven deterministically without a
//! filesystem.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;

use crate::queue::{BoundedQueue, PushResult};

/// Largest single datagram exchanged over IPC. Envelopes carrying a full
/// `ScadaPayload` plus a threshold share comfortably fit well under this;
/// sized generously so a future payload variant does not silently truncate.
pub const MAX_FRAME: usize = 64 * 1024;

/// A non-blocking, message-oriented, point-to-point channel.
///
/// `try_recv` never blocks: absence of a message is `Ok(None)`, not an
/// error, matching the "non-blocking on critical sockets" requirement of
/// spec §5.
pub trait IpcChannel: Send {
    fn send(&self, frame: &[u8]) -> io::Result<()>;
    fn try_recv(&self) -> io::Result<Option<Vec<u8>>>;
}

/// Production channel: a connected `UnixDatagram` in non-blocking mode.
pub struct UnixDatagramChannel {
    socket: UnixDatagram,
}

impl UnixDatagramChannel {
    /// Binds `local_path` and connects to `peer_path`. Both paths are
    /// expected to already exist as part of replica-process start-up
    /// (the binary that owns each socket file creates it before its peer
    /// connects).
    pub fn bind_and_connect(local_path: &Path, peer_path: &Path) -> io::Result<Self> {
        if local_path.exists() {
            std::fs::remove_file(local_path)?;
        }
        let socket = UnixDatagram::bind(local_path)?;
        Self::from_bound(socket, peer_path)
    }

    /// Connects an already-bound socket to `peer_path`. Useful when both
    /// endpoints of a pair must be bound before either can connect (the
    /// peer path must exist as a socket file for `connect` to succeed).
    pub fn from_bound(socket: UnixDatagram, peer_path: &Path) -> io::Result<Self> {
        socket.connect(peer_path)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl IpcChannel for UnixDatagramChannel {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.socket.send(frame)?;
        Ok(())
    }

    fn try_recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; MAX_FRAME];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// In-memory channel pair for tests: two handles sharing one direction's
/// queue each, so `a.send` is observed by `b.try_recv` and vice versa.
pub struct InMemoryChannel {
    outbound: std::sync::Arc<BoundedQueue<Vec<u8>>>,
    inbound: std::sync::Arc<BoundedQueue<Vec<u8>>>,
}

impl InMemoryChannel {
    /// Builds a connected pair: `(end_a, end_b)` where sending on one end
    /// is received on the other.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = std::sync::Arc::new(BoundedQueue::new(capacity));
        let b_to_a = std::sync::Arc::new(BoundedQueue::new(capacity));
        let end_a = Self {
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
        };
        let end_b = Self {
            outbound: b_to_a,
            inbound: a_to_b,
        };
        (end_a, end_b)
    }
}

impl IpcChannel for InMemoryChannel {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        match self.outbound.try_push(frame.to_vec()) {
            PushResult::Ok => Ok(()),
            PushResult::Backpressure(_) => Err(io::Error::new(io::ErrorKind::WouldBlock, "ipc queue full")),
        }
    }

    fn try_recv(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.inbound.try_pop())
    }
}
