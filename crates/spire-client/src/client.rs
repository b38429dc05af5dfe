//! The proxy logic every RTU, HMI, and benchmark process runs (spec §4.3).
//!
//! A client holds a single external-overlay socket: non-blocking, bound to
//! the reply multicast group's own port and joined to that group, used both
//! to unicast signed updates out and to receive threshold-signed replies
//! in. It never joins the replication core --
//! `spire-replication::ReplicaState` is Master-only -- so this is a much
//! thinner imperative shell than `spire-server`'s, reusing its `IpcChannel`
//! trait only for the local hop to the SCADA process.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;

use spire_cluster::ClusterState;
use spire_config::KeyMaterial;
use spire_server::IpcChannel;
use spire_types::{ClientIdx, Ordinal, ReplicaId, SeqPair};
use spire_wire::{tc_digest, Envelope, MessagePayload, ScadaPayload};

use crate::error::{ClientError, ClientResult};
use crate::fanout::control_center_fanout;

/// Largest single datagram read off the reply socket, matching
/// `spire-server`'s IPC frame ceiling -- a `TC_FINAL` plus its threshold
/// signature comfortably fits well under this.
const MAX_FRAME: usize = 64 * 1024;

/// Checks the embedded SCADA payload of a `TC_FINAL` reply against the
/// TO_CLIENT whitelist (spec §4.6): the outer envelope gate only confirms
/// the message is a `TC_FINAL` at all, not which payload it wraps.
fn to_client_whitelisted(payload: &ScadaPayload) -> bool {
    matches!(
        payload,
        ScadaPayload::HmiUpdate(_) | ScadaPayload::RtuFeedback(_) | ScadaPayload::Benchmark(_)
    )
}

pub struct Client<Sm> {
    client_idx: ClientIdx,
    site_id: u32,
    incarnation: u32,
    seq_num: u32,
    keys: Arc<KeyMaterial>,
    cluster: ClusterState,
    targets: Vec<SocketAddr>,
    rr_cursor: usize,
    socket: UdpSocket,
    applied: Ordinal,
    sm: Sm,
    fanout_override: usize,
}

impl<Sm: IpcChannel> Client<Sm> {
    /// Binds the external-overlay socket to `mcast_addr`'s port on every
    /// local interface and joins that reply multicast group -- the same
    /// socket is then used unconnected (`send_to`) to unicast requests to
    /// each fanout target, matching spec §4.3's "holds a single
    /// external-overlay socket". `incarnation` is expected to be the
    /// client's wall-clock seconds at start-up (spec's `SeqPair` doc:
    /// "always a fresh, strictly greater incarnation").
    pub fn new(
        client_idx: ClientIdx,
        site_id: u32,
        incarnation: u32,
        keys: Arc<KeyMaterial>,
        cluster: ClusterState,
        mcast_addr: SocketAddrV4,
        sm: Sm,
    ) -> ClientResult<Self> {
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, mcast_addr.port()));
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        socket.join_multicast_v4(mcast_addr.ip(), &Ipv4Addr::UNSPECIFIED)?;

        let targets = control_center_targets(&cluster);

        Ok(Self {
            client_idx,
            site_id,
            incarnation,
            seq_num: 0,
            keys,
            cluster,
            targets,
            rr_cursor: 0,
            socket,
            applied: Ordinal::ZERO,
            sm,
            fanout_override: 0,
        })
    }

    /// Overrides the derived `min(f+k+1, 2*(f+2))` fanout with a fixed
    /// count; `0` restores the derived value.
    pub fn with_fanout_override(mut self, fanout_override: usize) -> Self {
        self.fanout_override = fanout_override;
        self
    }

    /// Wraps `scada` in a signed `UPDATE` envelope and unicasts it to a
    /// round-robin window of control-center replicas (spec §4.3 step 1).
    pub fn send(&mut self, scada: ScadaPayload) -> ClientResult<()> {
        self.seq_num += 1;
        let seq = SeqPair::new(self.incarnation, self.seq_num);
        let envelope = Envelope::unsigned(
            self.site_id,
            ReplicaId::new(self.client_idx.as_usize() as u32),
            self.incarnation,
            self.seq_num,
            self.cluster.global_configuration_number(),
            MessagePayload::Update { seq, scada },
        )
        .sign(self.keys.signing_key());
        let bytes = postcard::to_allocvec(&envelope)?;

        let n = self.targets.len();
        if n == 0 {
            tracing::warn!("no control-center targets known, dropping update");
            return Ok(());
        }
        let derived = control_center_fanout(self.cluster.current());
        let fanout = if self.fanout_override == 0 { derived } else { self.fanout_override }.min(n);
        let start = self.rr_cursor % n;
        for offset in 0..fanout {
            let target = self.targets[(start + offset) % n];
            if let Err(err) = self.socket.send_to(&bytes, target) {
                tracing::debug!(peer = %target, error = %err, "update send failed");
            }
        }
        self.rr_cursor = self.rr_cursor.wrapping_add(1);
        Ok(())
    }

    /// Drains the local SCADA process's outbound queue, signing and fanning
    /// out each pending payload (spec §4.3: "the local SCADA process hands
    /// an update"). The same `sm` channel carries replies back out in
    /// `receive`, so one socket pair covers both directions.
    pub fn drain_local(&mut self) -> ClientResult<()> {
        while let Some(bytes) = self.sm.try_recv().map_err(ClientError::Io)? {
            let scada: ScadaPayload = postcard::from_bytes(&bytes)?;
            self.send(scada)?;
        }
        Ok(())
    }

    /// Drains the reply socket and processes every pending `TC_FINAL`.
    pub fn tick(&mut self) {
        let mut buf = vec![0u8; MAX_FRAME];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, _from)) => {
                    let bytes = &buf[..n];
                    match postcard::from_bytes::<Envelope>(bytes) {
                        Ok(envelope) => {
                            if let Err(err) = self.receive(envelope) {
                                tracing::debug!(error = %err, "dropping reply");
                            }
                        }
                        Err(err) => tracing::debug!(error = %err, "malformed reply datagram, dropping"),
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(error = %err, "reply socket recv failed");
                    break;
                }
            }
        }
    }

    /// Validates and applies one inbound reply (spec §4.3 `receive`).
    pub fn receive(&mut self, envelope: Envelope) -> ClientResult<()> {
        let sender = envelope.machine_id;
        let verifying_key = self.keys.verifying_key(sender)?;
        envelope.verify(verifying_key)?;

        let type_tag = envelope.type_tag();
        let MessagePayload::TcFinal { ordinal, payload, signature } = envelope.payload else {
            return Err(ClientError::UnexpectedPayload(type_tag));
        };
        if !to_client_whitelisted(&payload) {
            return Err(ClientError::UnexpectedPayload(type_tag));
        }

        let digest = tc_digest(ordinal, &payload);
        self.keys.threshold_public().verify(&digest, &signature)?;

        if ordinal <= self.applied {
            tracing::debug!(%ordinal, applied = %self.applied, "dropping non-increasing reply ordinal");
            return Ok(());
        }
        self.applied = ordinal;

        let bytes = postcard::to_allocvec(&*payload)?;
        self.sm.send(&bytes).map_err(ClientError::Io)?;
        Ok(())
    }

    /// Reloads keys and the cluster snapshot from the new configuration
    /// directory and zeroes `applied` (spec §4.3 `on_config_agent_message`:
    /// "the new configuration begins a new ordinal space").
    pub fn on_config_agent_message(&mut self, keys: Arc<KeyMaterial>, cluster: ClusterState) {
        self.targets = control_center_targets(&cluster);
        self.keys = keys;
        self.cluster = cluster;
        self.applied = Ordinal::ZERO;
        self.rr_cursor = 0;
    }

    pub fn applied(&self) -> Ordinal {
        self.applied
    }
}

fn control_center_targets(cluster: &ClusterState) -> Vec<SocketAddr> {
    let mut targets = Vec::new();
    for slot in &cluster.current().slots {
        let Some(id) = slot.replica_id() else { continue };
        if !cluster.is_control_center(id) {
            continue;
        }
        match slot.external_addr.parse() {
            Ok(addr) => targets.push(addr),
            Err(err) => tracing::warn!(peer = %id, addr = %slot.external_addr, error = %err, "malformed external address, skipping peer"),
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use spire_config::Paths;
    use spire_crypto::ThresholdKeyShare;
    use spire_wire::{BenchmarkPayload, ConfigMessage, ReplicaSlot, ReplicaType};
    use spire_server::InMemoryChannel;

    use super::*;

    fn slot(id: u32) -> ReplicaSlot {
        ReplicaSlot {
            tpm_based_id: id,
            replica_type: ReplicaType::ControlCenter,
            external_addr: format!("127.0.0.1:{}", 20000 + id),
            internal_addr: format!("127.0.0.1:{}", 21000 + id),
        }
    }

    fn config() -> ConfigMessage {
        ConfigMessage {
            n: 4,
            f: 1,
            k: 0,
            num_cc_replicas: 4,
            num_cc_sites: 2,
            num_dc_sites: 0,
            slots: (0..4).map(slot).collect(),
            global_configuration_number: 1,
        }
    }

    fn build_client() -> (Client<InMemoryChannel>, InMemoryChannel, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        for i in 0..4 {
            KeyMaterial::generate_for_test(&paths, ReplicaId::new(i), true, [5u8; 32]).unwrap();
        }
        let client_idx = ClientIdx::new(64);
        let cluster = ClusterState::new(config());
        let client_signing = paths.client_signing_key_file(client_idx);
        std::fs::create_dir_all(client_signing.parent().unwrap()).unwrap();
        std::fs::write(&client_signing, [6u8; 32]).unwrap();

        let keys = Arc::new(KeyMaterial::load_client(&paths, &client_signing, &cluster).unwrap());
        let (sm_here, sm_there) = InMemoryChannel::pair(8);

        // port 0: these tests drive `send`/`receive` directly rather than
        // exercising real multicast delivery, so an ephemeral port avoids
        // bind conflicts between tests running in parallel.
        let mcast: SocketAddrV4 = "239.1.1.1:0".parse().unwrap();
        let client = Client::new(client_idx, 0, 1, keys, cluster, mcast, sm_here).unwrap();
        (client, sm_there, dir)
    }

    #[test]
    fn send_stamps_an_envelope_the_client_can_sign_and_targets_are_populated() {
        let (mut client, _sm, _dir) = build_client();
        assert_eq!(client.targets.len(), 4);
        let scada = ScadaPayload::Benchmark(BenchmarkPayload {
            seq: SeqPair::new(1, 1),
            ping_sec: 0,
            ping_usec: 0,
            pong_sec: 0,
            pong_usec: 0,
        });
        client.send(scada).unwrap();
        assert_eq!(client.seq_num, 1);
    }

    #[test]
    fn receive_delivers_a_valid_reply_and_advances_applied() {
        let (mut client, sm, dir) = build_client();
        let paths = Paths::new(dir.path());
        let replica_id = ReplicaId::new(0);

        // recover replica 0's real key material from disk -- the same
        // files `build_client`'s `generate_for_test` call wrote, and the
        // same ones the client's own `load_client` call read its
        // verifying/threshold-public keys from.
        let replica_signing_bytes: [u8; 32] = std::fs::read(paths.signing_key_file(replica_id)).unwrap().try_into().unwrap();
        let replica_signing = spire_crypto::RsaSigningKey::from_bytes(&replica_signing_bytes);
        let share_bytes: [u8; 32] = std::fs::read(paths.share_key_file(replica_id)).unwrap().try_into().unwrap();
        let service_bytes: [u8; 32] = std::fs::read(paths.service_key_file()).unwrap().try_into().unwrap();
        let share_key = ThresholdKeyShare::new(
            replica_id,
            spire_crypto::RsaSigningKey::from_bytes(&share_bytes),
            spire_crypto::RsaSigningKey::from_bytes(&service_bytes),
        );

        let ordinal = Ordinal::new(1, 1, 1);
        let payload = ScadaPayload::Benchmark(BenchmarkPayload {
            seq: SeqPair::new(1, 1),
            ping_sec: 0,
            ping_usec: 0,
            pong_sec: 0,
            pong_usec: 0,
        });
        let digest = tc_digest(ordinal, &payload);
        // an empty share map with `required: 0` still exercises `combine`'s
        // real signing path -- only the quorum count is relaxed.
        let no_shares = std::collections::BTreeMap::new();
        let signature = share_key.combine(&digest, &no_shares, client.keys.threshold_public(), 0).unwrap();

        let envelope = Envelope::unsigned(
            0,
            replica_id,
            1,
            1,
            1,
            MessagePayload::TcFinal {
                ordinal,
                payload: Box::new(payload),
                signature,
            },
        )
        .sign(&replica_signing);

        client.receive(envelope).unwrap();
        assert_eq!(client.applied(), ordinal);
        assert!(sm.try_recv().unwrap().is_some());
    }

    #[test]
    fn receive_rejects_non_tc_final_payload() {
        let (mut client, _sm, _dir) = build_client();
        let envelope = Envelope::unsigned(0, ReplicaId::new(0), 1, 1, 1, MessagePayload::PrimeNoOp);
        let err = client.receive(envelope).unwrap_err();
        assert!(matches!(err, ClientError::Wire(_)));
    }

    #[test]
    fn drain_local_sends_every_queued_payload() {
        let (mut client, sm, _dir) = build_client();
        let scada = ScadaPayload::Benchmark(BenchmarkPayload {
            seq: SeqPair::new(1, 1),
            ping_sec: 0,
            ping_usec: 0,
            pong_sec: 0,
            pong_usec: 0,
        });
        sm.send(&postcard::to_allocvec(&scada).unwrap()).unwrap();
        client.drain_local().unwrap();
        assert_eq!(client.seq_num, 1);
    }
}
