//! `spire-node proxy` -- the client-side replay channel for a subscriber
//! process fronting one or more RTU field devices. The field-protocol
//! gateway that actually talks Modbus/DNP3 is an external collaborator
//! (out of scope): this command only runs the ITRC-Client proxy logic and
//! the local IPC hop the gateway uses to hand it outbound `RTU_DATA` and
//! receive `RTU_FEEDBACK` back.

use std::net::{IpAddr, SocketAddrV4};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use spire_client::Client;
use spire_cluster::ClusterState;
use spire_config::{ClientConfig, KeyMaterial, Paths};
use spire_server::UnixDatagramChannel;
use spire_types::{ClientIdx, CLIENT_REPLY_MCAST_PORT, CTRL_SPINES_MCAST_IP};
use tracing::info;

use super::{init_logging, install_shutdown_signal};

pub fn run(subscriber_id: u32, spines_addr: std::net::SocketAddr, num_rtus: u32, config_dir: &Path) -> Result<()> {
    let client_config_path = Paths::client_config_file(config_dir);
    let config = if client_config_path.exists() {
        ClientConfig::load(&client_config_path).context("failed to load client.toml")?
    } else {
        ClientConfig::default()
    };
    init_logging(&config.log_filter);

    let client_idx = ClientIdx::new(subscriber_id);
    let cluster_config = spire_config::load_cluster_config(&config.cluster_config_file)
        .with_context(|| format!("failed to load cluster config from {}", config.cluster_config_file.display()))?;
    let cluster = ClusterState::new(cluster_config);

    let paths = Paths::new(&config.key_dir);
    let signing_file = paths.client_signing_key_file(client_idx);
    let keys = Arc::new(
        KeyMaterial::load_client(&paths, &signing_file, &cluster).context("failed to load proxy client key material")?,
    );

    let incarnation = wall_clock_incarnation();
    let mcast_ip: IpAddr = CTRL_SPINES_MCAST_IP.parse().expect("built-in multicast group is valid");
    let mcast = match mcast_ip {
        IpAddr::V4(ip) => SocketAddrV4::new(ip, CLIENT_REPLY_MCAST_PORT),
        IpAddr::V6(_) => unreachable!("built-in multicast group is IPv4"),
    };

    let runtime_dir = config_dir.join("run");
    std::fs::create_dir_all(&runtime_dir).context("failed to create runtime socket directory")?;
    let local_path = runtime_dir.join(format!("proxy-{subscriber_id}.sock"));
    let gateway_path = runtime_dir.join(format!("proxy-{subscriber_id}-gateway.sock"));
    let sm = UnixDatagramChannel::bind_and_connect(&local_path, &gateway_path)
        .context("failed to bind the gateway-facing IPC socket (is the RTU gateway process running?)")?;

    let initial_gcn = cluster.global_configuration_number();
    let mut client = Client::new(client_idx, 0, incarnation, keys, cluster, mcast, sm)
        .context("failed to start proxy client")?
        .with_fanout_override(config.fanout_override);

    tracing::debug!(%spines_addr, "client always binds the reply multicast port, not an explicit local address");
    info!(subscriber = %client_idx, num_rtus, "starting RTU proxy");
    let shutdown_requested = install_shutdown_signal()?;

    let mut config_watch = ConfigAgentWatch::new(client_idx, config.cluster_config_file.clone(), paths, initial_gcn);

    while !shutdown_requested.load(Ordering::SeqCst) {
        if let Err(err) = client.drain_local() {
            tracing::debug!(error = %err, "dropping malformed outbound frame from gateway");
        }
        client.tick();
        config_watch.poll(&mut client);
        std::thread::sleep(Duration::from_millis(10));
    }

    info!("shutdown signal received, stopping RTU proxy");
    Ok(())
}

/// Watches the on-disk cluster configuration for a reconfiguration and,
/// once one lands, reloads this client's key material and cluster snapshot
/// and feeds them through `Client::on_config_agent_message` (spec §4.3
/// `on_config_agent_message`). A client has no replicated ordering core of
/// its own, so unlike a replica it learns about a new configuration by
/// rereading the same files it loaded at start-up rather than by observing
/// it arrive on an ordinal.
struct ConfigAgentWatch {
    client_idx: ClientIdx,
    cluster_config_file: std::path::PathBuf,
    paths: Paths,
    current_gcn: u32,
}

impl ConfigAgentWatch {
    fn new(client_idx: ClientIdx, cluster_config_file: std::path::PathBuf, paths: Paths, current_gcn: u32) -> Self {
        Self {
            client_idx,
            cluster_config_file,
            paths,
            current_gcn,
        }
    }

    fn poll<Sm: spire_server::IpcChannel>(&mut self, client: &mut Client<Sm>) {
        let cfg = match spire_config::load_cluster_config(&self.cluster_config_file) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::debug!(error = %err, "failed to reread cluster configuration, keeping current one");
                return;
            }
        };
        if cfg.global_configuration_number <= self.current_gcn {
            return;
        }

        let cluster = ClusterState::new(cfg);
        let signing_file = self.paths.client_signing_key_file(self.client_idx);
        match KeyMaterial::load_client(&self.paths, &signing_file, &cluster) {
            Ok(keys) => {
                self.current_gcn = cluster.global_configuration_number();
                tracing::info!(gcn = self.current_gcn, "reconfiguration observed, reloading client key material");
                client.on_config_agent_message(Arc::new(keys), cluster);
            }
            Err(err) => tracing::error!(error = %err, "failed to reload key material after reconfiguration"),
        }
    }
}

fn wall_clock_incarnation() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}
