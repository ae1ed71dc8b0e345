//! Replication Master
//!
//! The master side of the replication layer. It owns the authoritative
//! store, accepts replica connections on a dedicated port, floods each new
//! replica with the current state, and fans every subsequent mutation out
//! to all attached replicas.
//!
//! ## Per-Replica Tasks
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  mutation ──────────►│ broadcast: try_send to every │
//!                      │ replica's outbound queue     │
//!                      └──────────────┬───────────────┘
//!                                     │ (bounded mpsc, per replica)
//!                                     ▼
//!  ┌────────────┐      ┌──────────────────────────────┐
//!  │ heartbeat  │─────►│ writer task: drain queue,    │──► TCP to replica
//!  │ loop       │ PING │ serialize, write, flush      │
//!  └─────▲──────┘      └──────────────────────────────┘
//!        │ PONG timestamps
//!  ┌─────┴──────┐
//!  │ pong       │◄──────────────────────────────────────── TCP from replica
//!  │ listener   │
//!  └────────────┘
//! ```
//!
//! Every replica socket is written by exactly one task, so enqueue order is
//! write order and a replica applies operations in the order the master
//! issued them. One slow replica only backs up its own queue.
//!
//! ## Liveness
//!
//! The heartbeat loop is the sole authority for removing a replica. A
//! failed broadcast enqueue is logged and the operation dropped for that
//! replica only; a replica that has genuinely died also stops answering
//! pings and is reaped by its heartbeat loop within `max_missed` probes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::replication::health::HealthMonitor;
use crate::replication::protocol::{parse_operation, unix_timestamp, Operation};
use crate::replication::ReplicationError;
use crate::storage::Store;

/// Outbound operations buffered per replica before the writer task drains
/// them. A replica that falls further behind than this starts losing
/// operations and, soon after, heartbeats.
const REPLICA_QUEUE_SIZE: usize = 1024;

/// Grace window handed to each replica's health monitor.
const HEALTH_THRESHOLD: Duration = Duration::from_secs(5);

/// Tunables for the per-replica heartbeat loop.
///
/// The probe timeout equals the interval; there is no separate knob.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often each replica is pinged, and how long a pong may take
    pub interval: Duration,

    /// Consecutive failed probes before the replica is dropped
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_missed: 3,
        }
    }
}

/// Master-side state for one attached replica.
pub struct ReplicaSession {
    /// Peer address, for logging
    addr: SocketAddr,

    /// Outbound operation queue drained by this replica's writer task
    outbound: mpsc::Sender<Operation>,

    /// Probe bookkeeping for the heartbeat loop
    health: HealthMonitor,

    /// Signals the writer task, pong listener and heartbeat loop to stop
    stop_tx: watch::Sender<bool>,

    /// One-shot guard so the session is torn down exactly once
    closed: AtomicBool,
}

impl ReplicaSession {
    /// Non-blocking enqueue onto this replica's outbound queue.
    ///
    /// Returns false if the queue is full or its writer task is gone.
    fn enqueue(&self, op: Operation) -> bool {
        match self.outbound.try_send(op) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(replica = %self.addr, "Outbound queue full, dropping operation");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// The replication master.
///
/// Wrap in an `Arc`; the accept loop, heartbeat loops and client
/// connections all share it.
pub struct Master {
    /// The authoritative store
    store: Arc<Store>,

    /// Currently attached replicas. Never locked across I/O.
    replicas: RwLock<Vec<Arc<ReplicaSession>>>,

    /// Heartbeat tunables applied to every replica
    heartbeat: HeartbeatConfig,
}

impl Master {
    /// Creates a master over `store` with default heartbeat settings
    /// (5 second interval, 3 missed probes).
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_heartbeat(store, HeartbeatConfig::default())
    }

    /// Creates a master with explicit heartbeat settings.
    pub fn with_heartbeat(store: Arc<Store>, heartbeat: HeartbeatConfig) -> Self {
        Self {
            store,
            replicas: RwLock::new(Vec::new()),
            heartbeat,
        }
    }

    /// The store this master replicates.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // Mutations (applied locally, then broadcast)
    // ========================================================================

    /// Stores a key and replicates it. A zero `ttl` means no expiry.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.store.set_with_ttl(key, value, ttl);
        self.broadcast(Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
            timestamp: unix_timestamp(),
        });
    }

    /// Deletes a key locally and on every replica.
    ///
    /// Returns whether the key was present locally.
    pub fn delete(&self, key: &str) -> bool {
        let was_present = self.store.delete(key);
        self.broadcast(Operation::Delete {
            key: key.to_string(),
            timestamp: unix_timestamp(),
        });
        was_present
    }

    /// Empties the store locally and on every replica.
    pub fn flush(&self) {
        self.store.flush();
        self.broadcast(Operation::Flush {
            timestamp: unix_timestamp(),
        });
    }

    /// Reads a key from the local store. Reads are not replicated.
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Number of currently attached replicas.
    pub fn replica_count(&self) -> usize {
        self.replicas.read().unwrap().len()
    }

    /// Enqueues `op` onto every attached replica's outbound queue.
    ///
    /// The replica list lock is released before any queue is touched. A
    /// failed enqueue never removes the replica here; that verdict belongs
    /// to the heartbeat loop alone.
    fn broadcast(&self, op: Operation) {
        let sessions: Vec<Arc<ReplicaSession>> = self.replicas.read().unwrap().clone();

        for session in sessions {
            if !session.enqueue(op.clone()) {
                warn!(replica = %session.addr, "Failed to queue operation for replica");
            }
        }
    }

    // ========================================================================
    // Replica lifecycle
    // ========================================================================

    /// Binds the replication listener and serves replica connections
    /// forever.
    pub async fn listen(self: Arc<Self>, addr: &str) -> Result<(), ReplicationError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Replication listener started");
        self.serve(listener).await;
        Ok(())
    }

    /// Accepts replica connections on an already-bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!(replica = %addr, "New replica connected");
                    let master = Arc::clone(&self);
                    tokio::spawn(async move {
                        master.attach_replica(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept replica connection");
                }
            }
        }
    }

    /// Brings a freshly connected replica into the broadcast set.
    ///
    /// The current state is transferred synchronously first; only a replica
    /// that received the whole snapshot joins the replica list. Writes that
    /// race the transfer may reach the replica twice (snapshot and stream),
    /// which is harmless: applying a SET is idempotent and the later value
    /// wins.
    pub async fn attach_replica(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut writer = BufWriter::new(write_half);

        if let Err(e) = self.send_snapshot(&mut writer).await {
            warn!(replica = %addr, error = %e, "Initial state transfer failed, dropping replica");
            return;
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(REPLICA_QUEUE_SIZE);
        let (stop_tx, stop_rx) = watch::channel(false);

        // Capacity 1: the heartbeat loop consumes at most one pong per
        // probe, and the listener drops late pongs instead of queueing them
        let (pong_tx, pong_rx) = mpsc::channel(1);

        let session = Arc::new(ReplicaSession {
            addr,
            outbound: outbound_tx,
            health: HealthMonitor::new(HEALTH_THRESHOLD, self.heartbeat.max_missed),
            stop_tx,
            closed: AtomicBool::new(false),
        });

        self.replicas.write().unwrap().push(Arc::clone(&session));
        info!(replica = %addr, total = self.replica_count(), "Replica attached");

        tokio::spawn(writer_loop(writer, outbound_rx, stop_rx.clone(), addr));
        tokio::spawn(pong_listener(read_half, pong_tx, stop_rx.clone(), addr));
        tokio::spawn(Arc::clone(&self).heartbeat_loop(session, pong_rx, stop_rx));
    }

    /// Sends every live key as a SET with its remaining TTL.
    async fn send_snapshot(
        &self,
        writer: &mut BufWriter<OwnedWriteHalf>,
    ) -> std::io::Result<()> {
        let keys = self.store.keys();
        let total = keys.len();

        for key in keys {
            // A key can expire between keys() and here; skip it
            if let Some((value, ttl)) = self.store.get_with_ttl(&key) {
                let op = Operation::Set {
                    key,
                    value,
                    ttl,
                    timestamp: unix_timestamp(),
                };
                writer.write_all(op.serialize().as_bytes()).await?;
            }
        }
        writer.flush().await?;

        debug!(keys = total, "Initial state transfer complete");
        Ok(())
    }

    /// Probes one replica every heartbeat interval until it is dropped or
    /// the session is stopped.
    async fn heartbeat_loop(
        self: Arc<Self>,
        session: Arc<ReplicaSession>,
        mut pong_rx: mpsc::Receiver<i64>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.heartbeat.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so probing
        // starts one full interval after attach
        ticker.tick().await;

        loop {
            tokio::select! {
                result = stop_rx.changed() => {
                    if result.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {}
            }

            // A pong that arrived after the previous probe timed out is
            // stale; drain it so it cannot satisfy or poison this probe
            while pong_rx.try_recv().is_ok() {}

            let timestamp = unix_timestamp();
            if !session.enqueue(Operation::Ping { timestamp }) {
                warn!(replica = %session.addr, "Heartbeat send failed");
                if self.record_probe_failure(&session) {
                    return;
                }
                continue;
            }

            tokio::select! {
                result = stop_rx.changed() => {
                    if result.is_err() || *stop_rx.borrow() {
                        return;
                    }
                }
                pong = pong_rx.recv() => {
                    match pong {
                        Some(ts) if ts == timestamp => {
                            debug!(replica = %session.addr, "Replica is healthy");
                            session.health.record_success();
                        }
                        Some(ts) => {
                            warn!(
                                replica = %session.addr,
                                expected = timestamp,
                                got = ts,
                                "Pong timestamp mismatch"
                            );
                            if self.record_probe_failure(&session) {
                                return;
                            }
                        }
                        None => {
                            // Pong listener hit EOF and dropped its sender
                            debug!(replica = %session.addr, "Pong channel closed");
                            if self.record_probe_failure(&session) {
                                return;
                            }
                        }
                    }
                }
                _ = tokio::time::sleep(self.heartbeat.interval) => {
                    warn!(replica = %session.addr, "Heartbeat timed out");
                    if self.record_probe_failure(&session) {
                        return;
                    }
                }
            }
        }
    }

    /// Records one failed probe; returns true if that dropped the replica.
    fn record_probe_failure(&self, session: &Arc<ReplicaSession>) -> bool {
        session.health.record_failure();
        if session.health.is_healthy() {
            false
        } else {
            self.drop_replica(session);
            true
        }
    }

    /// Removes a replica from the broadcast set and stops its tasks.
    ///
    /// Runs at most once per session; later calls are no-ops. Stopping the
    /// session makes the writer task and pong listener drop their socket
    /// halves, closing the connection.
    pub fn drop_replica(&self, session: &Arc<ReplicaSession>) {
        if session.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!(replica = %session.addr, missed = session.health.missed(), "Removing replica");

        self.replicas
            .write()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, session));

        let _ = session.stop_tx.send(true);

        info!(replica = %session.addr, total = self.replica_count(), "Replica detached");
    }
}

/// Drains one replica's outbound queue onto its socket.
///
/// Back-to-back operations are written in one burst and flushed together.
/// A write error ends the task; the closed queue then surfaces through
/// failed heartbeat sends, and the heartbeat loop takes it from there.
async fn writer_loop(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut outbound_rx: mpsc::Receiver<Operation>,
    mut stop_rx: watch::Receiver<bool>,
    addr: SocketAddr,
) {
    loop {
        let op = tokio::select! {
            result = stop_rx.changed() => {
                if result.is_err() || *stop_rx.borrow() {
                    return;
                }
                continue;
            }
            op = outbound_rx.recv() => match op {
                Some(op) => op,
                None => return,
            }
        };

        if let Err(e) = write_burst(&mut writer, op, &mut outbound_rx).await {
            warn!(replica = %addr, error = %e, "Replica write failed");
            return;
        }
    }
}

/// Writes `first` plus whatever else is already queued, then flushes once.
async fn write_burst(
    writer: &mut BufWriter<OwnedWriteHalf>,
    first: Operation,
    outbound_rx: &mut mpsc::Receiver<Operation>,
) -> std::io::Result<()> {
    writer.write_all(first.serialize().as_bytes()).await?;
    while let Ok(op) = outbound_rx.try_recv() {
        writer.write_all(op.serialize().as_bytes()).await?;
    }
    writer.flush().await
}

/// Reads lines from one replica, forwarding PONG timestamps to its
/// heartbeat loop.
///
/// A pong arriving while no probe is waiting is dropped rather than queued;
/// a stale pong must not satisfy a later probe. Ends on EOF, read error or
/// session stop, closing the pong channel either way.
async fn pong_listener(
    read_half: OwnedReadHalf,
    pong_tx: mpsc::Sender<i64>,
    mut stop_rx: watch::Receiver<bool>,
    addr: SocketAddr,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            result = stop_rx.changed() => {
                if result.is_err() || *stop_rx.borrow() {
                    return;
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Ok(Operation::Pong { timestamp }) = parse_operation(&line) {
                            let _ = pong_tx.try_send(timestamp);
                        }
                    }
                    Ok(None) => {
                        debug!(replica = %addr, "Replica closed its connection");
                        return;
                    }
                    Err(e) => {
                        debug!(replica = %addr, error = %e, "Replica read failed");
                        return;
                    }
                }
            }
        }
    }
}
