//! Command Handling Module
//!
//! The command processing layer for CinderKV. It receives request lines
//! from the connection layer, executes them against the storage engine or
//! the replication master, and returns one reply line per request.
//!
//! ## Architecture
//!
//! ```text
//! Client Request Line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Tokenize     │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────────────┐
//!    ▼                    ▼
//! ┌────────┐       ┌────────────┐
//! │ Store  │       │   Master   │  (mutations fan out to replicas)
//! └────────┘       └────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `DEL key`
//! - `KEYS`, `SIZE`, `FLUSH`, `PING`

pub mod handler;

// Re-export commonly used types
pub use handler::{CommandHandler, Role};
