//! Replica Health Monitor
//!
//! Counter-based liveness judgement for a single replica connection. The
//! heartbeat loop records one success or failure per probe; a replica is
//! healthy while its consecutive failure count stays under the threshold.

use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct HealthState {
    /// Consecutive failed probes since the last success
    missed: u32,

    /// When the last successful probe completed
    last_success: Instant,
}

/// Tracks probe outcomes for one replica.
///
/// All methods are atomic with respect to each other; reads take a shared
/// lock, writes an exclusive one.
#[derive(Debug)]
pub struct HealthMonitor {
    state: RwLock<HealthState>,

    /// Consecutive failures at which the replica flips to unhealthy
    max_missed: u32,

    /// Grace window for time-based judgement (not consulted yet)
    threshold: Duration,
}

impl HealthMonitor {
    /// Creates a monitor that tolerates `max_missed - 1` consecutive
    /// failures.
    pub fn new(threshold: Duration, max_missed: u32) -> Self {
        Self {
            state: RwLock::new(HealthState {
                missed: 0,
                last_success: Instant::now(),
            }),
            max_missed,
            threshold,
        }
    }

    /// Records a successful probe, resetting the failure count.
    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        state.missed = 0;
        state.last_success = Instant::now();
    }

    /// Records a failed probe.
    pub fn record_failure(&self) {
        self.state.write().unwrap().missed += 1;
    }

    /// Whether the replica is still considered alive.
    pub fn is_healthy(&self) -> bool {
        self.state.read().unwrap().missed < self.max_missed
    }

    /// Consecutive failures since the last success.
    pub fn missed(&self) -> u32 {
        self.state.read().unwrap().missed
    }

    /// Time since the last successful probe.
    pub fn time_since_last_success(&self) -> Duration {
        self.state.read().unwrap().last_success.elapsed()
    }

    /// The configured grace window.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
