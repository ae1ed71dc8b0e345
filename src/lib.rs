//! # CinderKV - An In-Memory Key-Value Store with Replication
//!
//! CinderKV is an in-memory key-value store written in Rust. It combines a
//! size-bounded LRU cache with per-key TTL expiry and single-master,
//! multi-replica asynchronous replication.
//!
//! ## Features
//!
//! - **Bounded Memory**: configurable key limit with least-recently-used
//!   eviction, expired entries evicted first
//! - **TTL Support**: per-key time-to-live with lazy and active expiry
//! - **Replication**: a master streams every mutation to its replicas;
//!   replicas serve reads and are health-checked by heartbeats
//! - **Async I/O**: built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            CinderKV                               │
//! │                                                                   │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐            │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │            │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │            │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘            │
//! │                                               │                   │
//! │                            ┌──────────────────┤                   │
//! │                            ▼                  ▼                   │
//! │                     ┌─────────────┐    ┌─────────────┐            │
//! │                     │   Master    │───>│    Store    │            │
//! │                     │ (broadcast) │    │ map + LRU   │            │
//! │                     └──────┬──────┘    └─────────────┘            │
//! │                            │                  ▲                   │
//! │              to replicas ──┘                  │                   │
//! │                                        ┌──────┴──────┐            │
//! │                                        │   Reaper    │            │
//! │                                        │ (bg task)   │            │
//! │                                        └─────────────┘            │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cinderkv::commands::CommandHandler;
//! use cinderkv::connection::{handle_connection, ConnectionStats};
//! use cinderkv::storage::{start_reaper, Store};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(Store::new(10_000));
//!     let _reaper = start_reaper(Arc::clone(&store));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let commands = CommandHandler::standalone(Arc::clone(&store));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, commands, stats));
//!     }
//! }
//! ```
//!
//! ## Client Protocol
//!
//! Line-oriented text over TCP, one command per line:
//!
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `DEL key`
//! - `KEYS`, `SIZE`, `FLUSH`, `PING`
//!
//! Connect with `nc localhost 6379` and type commands directly.
//!
//! ## Module Overview
//!
//! - [`storage`]: the LRU/TTL store and its background reaper
//! - [`replication`]: master, slave, wire codec, health monitoring
//! - [`commands`]: role-aware command dispatch
//! - [`connection`]: client connection management
//!
//! ## Design Highlights
//!
//! ### One Lock, Two Structures
//!
//! The store guards its hash map and its recency list with a single mutex
//! so the two can never disagree about which keys exist. Critical sections
//! are short and never touch the network.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired on access, and a background reaper sweeps for
//! keys that expire unobserved. The eviction path also prefers expired
//! entries over live ones.
//!
//! ### Heartbeat-Driven Membership
//!
//! The master pings every replica on an interval and counts misses; only
//! the heartbeat loop may remove a replica. A failed broadcast write alone
//! never does, so a transient blip cannot depopulate the cluster.

pub mod commands;
pub mod connection;
pub mod replication;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Role};
pub use connection::{handle_connection, ConnectionStats};
pub use replication::{HeartbeatConfig, Master, Operation, Slave};
pub use storage::{start_reaper, Reaper, Store};

/// The default port for client connections
pub const DEFAULT_PORT: u16 = 6379;

/// The default port for replica connections
pub const DEFAULT_REPLICATION_PORT: u16 = 6380;

/// The default host to bind to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default maximum number of keys before eviction
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Version of CinderKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
