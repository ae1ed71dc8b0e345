//! Background Expiry Reaper
//!
//! A background task that periodically scans the store for expired keys and
//! removes them. This is the "active" half of expiry; the "lazy" half
//! happens on access in the store itself.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry only fires when a key is touched. A key that expires and is
//! never accessed again would otherwise sit in memory until an eviction
//! sweep happens to visit it. The reaper bounds that lifetime.
//!
//! The reaper is an optimization, never a correctness requirement: reads
//! and the eviction sweep observe expiry on their own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::Store;

/// How often the reaper wakes up by default.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);

/// A handle to the running reaper task.
///
/// The task stops when [`Reaper::stop`] is called or the handle is dropped;
/// [`Reaper::shutdown`] additionally waits for the task to finish, so no
/// task outlives the store it sweeps.
#[derive(Debug)]
pub struct Reaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// The reaper task, for join-on-shutdown
    task: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts the reaper as a background task waking every `interval`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use cinderkv::storage::{Reaper, Store, DEFAULT_REAP_INTERVAL};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new(10_000));
    /// let reaper = Reaper::start(Arc::clone(&store), DEFAULT_REAP_INTERVAL);
    ///
    /// // ... later, on shutdown:
    /// reaper.shutdown().await;
    /// ```
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(reaper_loop(store, interval, shutdown_rx));

        info!(interval_secs = interval.as_secs(), "Background reaper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop at its next wake-up.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the reaper and waits for the task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main reaper loop.
async fn reaper_loop(store: Arc<Store>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    return;
                }
            }
        }

        let removed = store.cleanup_expired();
        if removed > 0 {
            debug!(
                removed = removed,
                keys_remaining = store.len(),
                "Reaped expired keys"
            );
        }
    }
}

/// Starts the reaper with the default interval.
pub fn start_reaper(store: Arc<Store>) -> Reaper {
    Reaper::start(store, DEFAULT_REAP_INTERVAL)
}
