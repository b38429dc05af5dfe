//! Spire ITRC unified CLI.
//!
//! # Quick start
//!
//! ```bash
//! # Run a replica (spines addresses are this replica's own overlay ports)
//! spire-node server 1 127.0.0.1:11001 127.0.0.1:10001
//!
//! # Drive a synthetic benchmark load against the cluster
//! spire-node benchmark 72 127.0.0.1:0 1000 100
//!
//! # Run the client-side replay channel for an RTU gateway
//! spire-node proxy 5 127.0.0.1:0 4
//! ```

mod commands;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spire-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an ITRC-Master/ITRC-Inject replica process.
    Server {
        /// This replica's id.
        replica_id: u32,
        /// This replica's internal overlay address (control-center mesh).
        spines_int_addr: SocketAddr,
        /// This replica's external overlay address (client traffic).
        spines_ext_addr: SocketAddr,
        /// Directory holding replica.toml, cluster.toml, and the key directory.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,
    },

    /// Run a synthetic benchmark load generator against the cluster.
    Benchmark {
        /// This client's index.
        client_id: u32,
        /// This client's overlay address.
        spines_addr: SocketAddr,
        /// Microseconds to sleep between successive updates.
        poll_usec: u64,
        /// Number of updates to send before exiting.
        num_polls: u64,
        /// Directory holding client.toml, cluster.toml, and the key directory.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,
    },

    /// Run the client-side replay channel for an RTU field-device gateway.
    Proxy {
        /// This subscriber process's client index.
        subscriber_id: u32,
        /// This client's overlay address.
        spines_addr: SocketAddr,
        /// Number of RTU field devices this subscriber multiplexes.
        num_rtus: u32,
        /// Directory holding client.toml, cluster.toml, and the key directory.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            replica_id,
            spines_int_addr,
            spines_ext_addr,
            config_dir,
        } => commands::server::run(replica_id, spines_int_addr, spines_ext_addr, &config_dir),
        Commands::Benchmark {
            client_id,
            spines_addr,
            poll_usec,
            num_polls,
            config_dir,
        } => commands::benchmark::run(client_id, spines_addr, poll_usec, num_polls, &config_dir),
        Commands::Proxy {
            subscriber_id,
            spines_addr,
            num_rtus,
            config_dir,
        } => commands::proxy::run(subscriber_id, spines_addr, num_rtus, &config_dir),
    }
}
