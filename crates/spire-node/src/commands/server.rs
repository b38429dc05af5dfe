//! `spire-node server` -- runs one ITRC-Master/ITRC-Inject replica process.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use spire_cluster::ClusterState;
use spire_config::{KeyMaterial, Paths, ReplicaConfig};
use spire_server::{ReplicaRuntime, ReplicaRuntimeConfig};
use spire_types::{ReplicaId, CLIENT_REPLY_MCAST_PORT, CTRL_SPINES_MCAST_IP};
use tracing::info;

use super::{init_logging, install_shutdown_signal};

/// Local ports the co-located Prime process listens on for this replica's
/// Master/Inject IPC datagram paths. Not part of the wire contract (spec
/// §6 names the two overlay addresses only, not Prime's IPC ports), so
/// these stay a `spire-node`-local convention rather than a shared
/// constant.
const PRIME_MASTER_PEER_BASE: u16 = 14000;
const PRIME_MASTER_LOCAL_BASE: u16 = 14500;
const PRIME_INJECT_PEER_BASE: u16 = 15000;
const PRIME_INJECT_LOCAL_BASE: u16 = 15500;

pub fn run(replica_id: u32, spines_int_addr: SocketAddr, spines_ext_addr: SocketAddr, config_dir: &Path) -> Result<()> {
    let replica_config_path = Paths::replica_config_file(config_dir);
    let config = if replica_config_path.exists() {
        ReplicaConfig::load(&replica_config_path).context("failed to load replica.toml")?
    } else {
        ReplicaConfig::default()
    };
    init_logging(&config.log_filter);

    let replica_id = ReplicaId::new(replica_id);
    let cluster_config = spire_config::load_cluster_config(&config.cluster_config_file)
        .with_context(|| format!("failed to load cluster config from {}", config.cluster_config_file.display()))?;
    let cluster = ClusterState::new(cluster_config);
    let site_id = replica_id.as_u32() % cluster.current().num_cc_sites.max(1);

    let paths = Paths::new(&config.key_dir);
    let keys = Arc::new(
        KeyMaterial::load_replica(&paths, replica_id, &cluster).context("failed to load replica key material")?,
    );

    let incarnation = wall_clock_incarnation();
    let rid = replica_id.as_u32();
    let mcast_ip: IpAddr = CTRL_SPINES_MCAST_IP.parse().expect("built-in multicast group is valid");

    let runtime_dir = config_dir.join("run");
    std::fs::create_dir_all(&runtime_dir).context("failed to create runtime socket directory")?;

    let runtime_config = ReplicaRuntimeConfig {
        replica_id,
        site_id,
        incarnation,
        master_prime_local: loopback(PRIME_MASTER_LOCAL_BASE + rid as u16),
        master_prime_peer: loopback(PRIME_MASTER_PEER_BASE + rid as u16),
        inject_prime_local: loopback(PRIME_INJECT_LOCAL_BASE + rid as u16),
        inject_prime_peer: loopback(PRIME_INJECT_PEER_BASE + rid as u16),
        internal_local: spines_int_addr,
        external_local: spines_ext_addr,
        client_mcast_addr: SocketAddr::new(mcast_ip, CLIENT_REPLY_MCAST_PORT),
        sm_socket_path: socket_path(&runtime_dir, "sm", rid),
        sm_peer_socket_path: socket_path(&runtime_dir, "sm-peer", rid),
        config_agent_socket_path: socket_path(&runtime_dir, "config-agent", rid),
        config_agent_peer_socket_path: socket_path(&runtime_dir, "config-agent-peer", rid),
        key_dir: config.key_dir.clone(),
        queue_capacity: config.queue_capacity,
    };

    info!(replica = %replica_id, site_id, internal = %spines_int_addr, external = %spines_ext_addr, "starting replica");
    let runtime = ReplicaRuntime::start(runtime_config, cluster, keys).context("failed to start replica runtime")?;

    let shutdown_requested = install_shutdown_signal()?;
    while !shutdown_requested.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    info!("shutdown signal received, stopping replica");
    runtime.shutdown();
    Ok(())
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), port)
}

fn socket_path(dir: &Path, label: &str, replica_id: u32) -> PathBuf {
    dir.join(format!("{label}-{replica_id}.sock"))
}

fn wall_clock_incarnation() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}
