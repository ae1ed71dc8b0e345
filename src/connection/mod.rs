//! Connection Handling Module
//!
//! This module manages individual client connections to CinderKV. Each
//! client connection is handled by its own async task, allowing the server
//! to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept()
//!                        ▼
//!            ┌────────────────────────┐
//!            │   For each client...   │
//!            └────────────┬───────────┘
//!                         │ spawn task
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │  │ Read bytes  │───>│ Extract line │───>│ Execute cmd  │    │
//! │  └─────────────┘    └──────────────┘    └──────┬───────┘    │
//! │                                                ▼            │
//! │                                        ┌──────────────┐     │
//! │                                        │ Send reply   │     │
//! │                                        └──────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: one Tokio task per client, no thread per connection
//! - **Buffer Management**: `BytesMut` accumulation for partial lines
//! - **Pipelining**: multiple commands in a single TCP packet
//! - **Statistics**: connection and command counters

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
