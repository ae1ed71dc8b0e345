//! Storage Engine Module
//!
//! This module provides the core storage functionality for CinderKV: a
//! thread-safe key-value store with LRU eviction, per-key TTL expiry, and a
//! background reaper for keys that expire unobserved.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │  ┌────────────────────┐      ┌──────────────────────────┐   │
//! │  │ HashMap<K, Entry>  │◄────►│ LruIndex                 │   │
//! │  │ value + expiry     │      │ recency order, O(1) ops  │   │
//! │  └────────────────────┘      └──────────────────────────┘   │
//! │             one Mutex over both structures                  │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │         Reaper            │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Bounded Capacity**: once full, the least recently used key is
//!   evicted, expired entries first
//! - **TTL Support**: keys can carry a time-to-live
//! - **Lazy Expiry**: expired keys are removed on access
//! - **Active Expiry**: the reaper cleans up keys nobody touches again
//!
//! ## Example
//!
//! ```
//! use cinderkv::storage::Store;
//! use std::time::Duration;
//!
//! let store = Store::new(3);
//!
//! store.set("a", "1");
//! store.set("b", "2");
//! store.set("c", "3");
//! store.set("d", "4"); // evicts "a"
//!
//! assert_eq!(store.get("a"), None);
//! assert_eq!(store.get("d"), Some("4".to_string()));
//!
//! // Set with TTL
//! store.set_with_ttl("session", "token123", Duration::from_secs(3600));
//! ```

pub mod lru;
pub mod reaper;
pub mod store;

// Re-export commonly used types
pub use lru::{Handle, LruIndex};
pub use reaper::{start_reaper, Reaper, DEFAULT_REAP_INTERVAL};
pub use store::{Store, StoreStats};
