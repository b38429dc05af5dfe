//! `spire-node benchmark` -- drives the ITRC-Client proxy logic with a
//! synthetic load generator standing in for a real benchmark harness.

use std::net::{IpAddr, SocketAddrV4};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use spire_client::Client;
use spire_cluster::ClusterState;
use spire_config::{ClientConfig, KeyMaterial, Paths};
use spire_server::InMemoryChannel;
use spire_types::{ClientIdx, SeqPair, CLIENT_REPLY_MCAST_PORT, CTRL_SPINES_MCAST_IP};
use spire_wire::{BenchmarkPayload, ScadaPayload};
use tracing::info;

use super::{init_logging, install_shutdown_signal};

pub fn run(client_id: u32, spines_addr: std::net::SocketAddr, poll_usec: u64, num_polls: u64, config_dir: &Path) -> Result<()> {
    let client_config_path = Paths::client_config_file(config_dir);
    let config = if client_config_path.exists() {
        ClientConfig::load(&client_config_path).context("failed to load client.toml")?
    } else {
        ClientConfig::default()
    };
    init_logging(&config.log_filter);

    let client_idx = ClientIdx::new(client_id);
    let cluster_config = spire_config::load_cluster_config(&config.cluster_config_file)
        .with_context(|| format!("failed to load cluster config from {}", config.cluster_config_file.display()))?;
    let cluster = ClusterState::new(cluster_config);

    let paths = Paths::new(&config.key_dir);
    let signing_file = paths.client_signing_key_file(client_idx);
    let keys = Arc::new(
        KeyMaterial::load_client(&paths, &signing_file, &cluster).context("failed to load benchmark client key material")?,
    );

    let incarnation = wall_clock_incarnation();
    let mcast_ip: IpAddr = CTRL_SPINES_MCAST_IP.parse().expect("built-in multicast group is valid");
    let mcast = match mcast_ip {
        IpAddr::V4(ip) => SocketAddrV4::new(ip, CLIENT_REPLY_MCAST_PORT),
        IpAddr::V6(_) => unreachable!("built-in multicast group is IPv4"),
    };

    // no real downstream state machine for a synthetic benchmark run; keep
    // the peer end locally to read delivered replies back out for logging.
    let (sm_here, sm_there) = InMemoryChannel::pair(256);
    let mut client = Client::new(client_idx, 0, incarnation, keys, cluster, mcast, sm_here)
        .context("failed to start benchmark client")?
        .with_fanout_override(config.fanout_override);

    tracing::debug!(%spines_addr, "client always binds the reply multicast port, not an explicit local address");
    info!(client = %client_idx, num_polls, poll_usec, "starting benchmark run");
    let shutdown_requested = install_shutdown_signal()?;

    for n in 1..=num_polls {
        if shutdown_requested.load(Ordering::SeqCst) {
            info!("shutdown signal received, stopping benchmark run early");
            break;
        }
        let ping = wall_clock();
        let scada = ScadaPayload::Benchmark(BenchmarkPayload {
            seq: SeqPair::new(incarnation, n as u32),
            ping_sec: ping.0,
            ping_usec: ping.1,
            pong_sec: 0,
            pong_usec: 0,
        });
        client.send(scada).context("failed to send benchmark update")?;
        std::thread::sleep(Duration::from_micros(poll_usec));
        client.tick();
        drain_replies(&sm_there);
    }

    // grace period: let in-flight replies for the last few polls arrive.
    for _ in 0..20 {
        if shutdown_requested.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
        client.tick();
        drain_replies(&sm_there);
    }

    info!("benchmark run complete");
    Ok(())
}

fn drain_replies(sm: &InMemoryChannel) {
    use spire_server::IpcChannel;
    while let Ok(Some(bytes)) = sm.try_recv() {
        match postcard::from_bytes::<ScadaPayload>(&bytes) {
            Ok(ScadaPayload::Benchmark(reply)) => {
                let now = wall_clock();
                let sent_usec = reply.ping_sec as i64 * 1_000_000 + reply.ping_usec as i64;
                let now_usec = now.0 as i64 * 1_000_000 + now.1 as i64;
                let latency_usec = (now_usec - sent_usec).max(0);
                info!(seq = ?reply.seq, latency_usec, "benchmark reply delivered");
            }
            Ok(other) => tracing::debug!(?other, "unexpected payload delivered to benchmark client"),
            Err(err) => tracing::debug!(error = %err, "malformed payload delivered to benchmark client"),
        }
    }
}

fn wall_clock_incarnation() -> u32 {
    wall_clock().0
}

fn wall_clock() -> (u32, u32) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as u32, now.subsec_micros())
}
