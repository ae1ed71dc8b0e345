//! Replication Module
//!
//! Single-master, multi-replica asynchronous replication. The master
//! applies every mutation to its own store and pushes it to all attached
//! replicas over a line-oriented TCP stream; replicas apply the stream in
//! order and serve reads from their local store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │          Master          │
//! │  ┌────────┐ ┌─────────┐  │        SET/DELETE/FLUSH stream
//! │  │ Store  │ │ replica │──┼──────────────┬───────────────┐
//! │  └────────┘ │ list    │  │              ▼               ▼
//! │             └─────────┘  │      ┌──────────────┐ ┌──────────────┐
//! │   per replica:           │      │    Slave     │ │    Slave     │
//! │   writer task            │      │  ┌────────┐  │ │  ┌────────┐  │
//! │   heartbeat loop     ◄───┼─PONG─│  │ Store  │  │ │  │ Store  │  │
//! │   pong listener          │─PING►│  └────────┘  │ │  └────────┘  │
//! └──────────────────────────┘      └──────────────┘ └──────────────┘
//! ```
//!
//! ## Guarantees (and non-guarantees)
//!
//! - A replica applies operations in the order the master issued them over
//!   that replica's connection. There is no cross-replica ordering.
//! - Replication is asynchronous and best-effort; read-your-writes holds
//!   only when reading from the master.
//! - A replica attaching mid-stream first receives a snapshot of every
//!   live key, then the live stream.
//! - Replicas that stop answering heartbeats are dropped by the master.
//!
//! ## Modules
//!
//! - [`protocol`]: the line-oriented operation codec
//! - [`health`]: counter-based liveness judgement per replica
//! - [`master`]: accept loop, snapshot transfer, broadcast, heartbeats
//! - [`slave`]: stream apply with TTL transit compensation

pub mod health;
pub mod master;
pub mod protocol;
pub mod slave;

use thiserror::Error;

/// Errors surfaced by the replication layer.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// I/O error on a replication socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `run` was called before `connect`
    #[error("not connected to master")]
    NotConnected,
}

// Re-export commonly used types
pub use health::HealthMonitor;
pub use master::{HeartbeatConfig, Master, ReplicaSession};
pub use protocol::{parse_operation, unix_timestamp, Operation, ParseError};
pub use slave::Slave;
