//! CinderKV Server Binary
//!
//! Starts a CinderKV node in one of three roles:
//!
//! - `standalone`: a single node serving clients
//! - `master`: additionally listens for replicas on the replication port
//!   and streams every mutation to them
//! - `slave`: connects to a master, applies its stream, and serves reads

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use cinderkv::commands::{CommandHandler, Role};
use cinderkv::connection::{handle_connection, ConnectionStats};
use cinderkv::replication::{Master, Slave};
use cinderkv::storage::{start_reaper, Store};

/// CinderKV Server
#[derive(Parser, Debug)]
#[command(name = "cinderkv")]
#[command(about = "In-memory key-value store with LRU eviction, TTL and replication")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = cinderkv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on for clients
    #[arg(short, long, default_value_t = cinderkv::DEFAULT_PORT)]
    port: u16,

    /// Role: master, slave or standalone
    #[arg(short, long, default_value = "standalone")]
    role: Role,

    /// Master address to replicate from (slave role)
    #[arg(short, long, default_value = "localhost:6380")]
    master: String,

    /// Port to listen on for replicas (master role)
    #[arg(long, default_value_t = cinderkv::DEFAULT_REPLICATION_PORT)]
    replication_port: u16,

    /// Maximum number of keys before LRU eviction (0 = unbounded)
    #[arg(long, default_value_t = cinderkv::DEFAULT_MAX_KEYS)]
    max_keys: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cinderkv=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    info!(version = cinderkv::VERSION, role = %args.role, "Starting CinderKV");

    let store = Arc::new(Store::new(args.max_keys));
    let _reaper = start_reaper(Arc::clone(&store));

    // Role-specific wiring decides what the command handler mutates
    let commands = match args.role {
        Role::Standalone => CommandHandler::standalone(Arc::clone(&store)),
        Role::Master => {
            let master = Arc::new(Master::new(Arc::clone(&store)));
            let replication_addr = format!("{}:{}", args.host, args.replication_port);

            let acceptor = Arc::clone(&master);
            tokio::spawn(async move {
                if let Err(e) = acceptor.listen(&replication_addr).await {
                    error!(error = %e, "Replication listener failed");
                    std::process::exit(1);
                }
            });

            CommandHandler::master(master)
        }
        Role::Slave => {
            let slave = Arc::new(Slave::new(Arc::clone(&store), args.master.clone()));
            slave.connect().await?;

            let runner = Arc::clone(&slave);
            tokio::spawn(async move {
                if let Err(e) = runner.run().await {
                    error!(error = %e, "Replication stream failed");
                }
            });

            CommandHandler::slave(Arc::clone(&store))
        }
    };

    let stats = Arc::new(ConnectionStats::new());
    let listener = TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    info!(addr = %listener.local_addr()?, "Listening for clients");

    // Serve until Ctrl+C
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, commands, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming client connections.
async fn accept_loop(listener: TcpListener, commands: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let commands = commands.clone();
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, commands, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
