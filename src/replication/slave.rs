//! Replication Slave
//!
//! The replica side of the replication layer. A slave dials the master,
//! decodes the operation stream, and applies every operation to its local
//! store strictly in arrival order; ordering is the only consistency
//! guarantee replication makes.
//!
//! TTLs are adjusted for transit: a SET carrying a TTL also carries the
//! master's issue timestamp, and the slave subtracts however long the
//! operation took to arrive. A key whose TTL was consumed entirely in
//! transit is never stored at all.
//!
//! PINGs from the master are answered with a PONG echoing the probe's
//! timestamp; that echo is what keeps the master's health monitor for this
//! replica happy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::replication::protocol::{parse_operation, unix_timestamp, Operation};
use crate::replication::ReplicationError;
use crate::storage::Store;

/// A read-only follower applying the master's operation stream to a local
/// store.
///
/// Wrap in an `Arc`: `run` executes on its own task while `get` serves
/// reads and `close` can be called from anywhere.
pub struct Slave {
    /// The local store the stream is applied to
    store: Arc<Store>,

    /// Where the master listens for replicas
    master_addr: String,

    /// Connection established by `connect`, consumed by `run`
    stream: Mutex<Option<TcpStream>>,

    /// Signals `run` to stop at its next event
    shutdown_tx: watch::Sender<bool>,
}

impl Slave {
    /// Creates a slave that will replicate from `master_addr` into `store`.
    pub fn new(store: Arc<Store>, master_addr: impl Into<String>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            master_addr: master_addr.into(),
            stream: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Dials the master's replication port.
    pub async fn connect(&self) -> Result<(), ReplicationError> {
        let stream = TcpStream::connect(&self.master_addr).await?;
        info!(master = %self.master_addr, "Connected to master");
        *self.stream.lock().unwrap() = Some(stream);
        Ok(())
    }

    /// Reads and applies the replication stream until the master closes
    /// the connection or [`Slave::close`] is called.
    ///
    /// Operations are applied one at a time, in order. A malformed line is
    /// logged and skipped; the stream keeps going.
    pub async fn run(&self) -> Result<(), ReplicationError> {
        let stream = {
            let mut guard = self.stream.lock().unwrap();
            guard.take()
        };
        let stream = match stream {
            Some(stream) => stream,
            None => return Err(ReplicationError::NotConnected),
        };

        let (read_half, write_half) = stream.into_split();
        let mut writer = BufWriter::new(write_half);
        let mut lines = BufReader::new(read_half).lines();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Replication stream closed");
                        return Ok(());
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            match parse_operation(&line) {
                                Ok(op) => self.apply(op, &mut writer).await?,
                                Err(e) => {
                                    warn!(error = %e, line = %line, "Skipping malformed replication line");
                                }
                            }
                        }
                        Ok(None) => {
                            info!(master = %self.master_addr, "Master closed the replication stream");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Applies one operation to the local store.
    async fn apply(
        &self,
        op: Operation,
        writer: &mut BufWriter<OwnedWriteHalf>,
    ) -> Result<(), ReplicationError> {
        match op {
            Operation::Set {
                key,
                value,
                ttl,
                timestamp,
            } => {
                if ttl > Duration::ZERO {
                    // Shorten the TTL by the transit delay
                    let elapsed =
                        Duration::from_secs(unix_timestamp().saturating_sub(timestamp).max(0) as u64);

                    if ttl <= elapsed {
                        debug!(key = %key, "Key expired in transit, skipping");
                    } else {
                        let remaining = ttl - elapsed;
                        debug!(key = %key, remaining_ms = remaining.as_millis() as u64, "Applied SET with TTL");
                        self.store.set_with_ttl(key, value, remaining);
                    }
                } else {
                    debug!(key = %key, "Applied SET");
                    self.store.set(key, value);
                }
            }
            Operation::Delete { key, .. } => {
                debug!(key = %key, "Applied DELETE");
                self.store.delete(&key);
            }
            Operation::Flush { .. } => {
                debug!("Applied FLUSH");
                self.store.flush();
            }
            Operation::Ping { timestamp } => {
                // Heartbeat handshake: echo the probe's timestamp back
                let pong = Operation::Pong { timestamp };
                writer.write_all(pong.serialize().as_bytes()).await?;
                writer.flush().await?;
            }
            Operation::Pong { .. } => {}
            Operation::Unknown { kind } => {
                debug!(kind = %kind, "Ignoring unknown operation");
            }
        }
        Ok(())
    }

    /// Reads a key from the local store. Slaves serve reads.
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Signals `run` to stop at its next event.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::master::{HeartbeatConfig, Master};
    use tokio::net::TcpListener;

    /// Binds a raw listener posing as a master and connects a running
    /// slave to it. Returns the master-side socket and the slave's store.
    async fn start_slave_against_raw_master() -> (TcpStream, Arc<Store>, Arc<Slave>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = Arc::new(Store::new(0));
        let slave = Arc::new(Slave::new(Arc::clone(&store), addr.to_string()));
        slave.connect().await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();

        let runner = Arc::clone(&slave);
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        (socket, store, slave)
    }

    #[tokio::test]
    async fn test_applies_stream_in_order() {
        let (mut socket, store, _slave) = start_slave_against_raw_master().await;

        let now = unix_timestamp();
        let script = format!(
            "SET key v1 0 {now}\nSET key v2 0 {now}\nDELETE other {now}\n"
        );
        socket.write_all(script.as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        // The later SET won
        assert_eq!(store.get("key"), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_transit_compensation() {
        let (mut socket, store, _slave) = start_slave_against_raw_master().await;

        let now = unix_timestamp();

        // Issued 2 seconds ago with a 10 second TTL: ~8 seconds remain
        let clipped = format!("SET clipped v 10000 {}\n", now - 2);
        // Issued 5 seconds ago with a 1 second TTL: dead on arrival
        let stale = format!("SET stale v 1000 {}\n", now - 5);
        // No TTL: timestamp age is irrelevant
        let plain = format!("SET plain v 0 {}\n", now - 60);

        socket.write_all(clipped.as_bytes()).await.unwrap();
        socket.write_all(stale.as_bytes()).await.unwrap();
        socket.write_all(plain.as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let (_, ttl) = store.get_with_ttl("clipped").unwrap();
        assert!(ttl <= Duration::from_secs(8));
        assert!(ttl > Duration::from_secs(6));

        assert_eq!(store.get("stale"), None);
        assert_eq!(store.get("plain"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_ping_echoes_pong() {
        let (mut socket, _store, _slave) = start_slave_against_raw_master().await;

        socket.write_all(b"PING 12345\n").await.unwrap();

        let (read_half, _write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();

        assert_eq!(
            parse_operation(&line).unwrap(),
            Operation::Pong { timestamp: 12345 }
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (mut socket, store, _slave) = start_slave_against_raw_master().await;

        let now = unix_timestamp();
        let script = format!("SET broken value notanumber {now}\ngibberish\nSET good v 0 {now}\n");
        socket.write_all(script.as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get("broken"), None);
        assert_eq!(store.get("good"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_operations_are_ignored() {
        let (mut socket, store, _slave) = start_slave_against_raw_master().await;

        let now = unix_timestamp();
        let script = format!("UPSERT key value\nSET key v 0 {now}\n");
        socket.write_all(script.as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get("key"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_close_stops_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = Arc::new(Store::new(0));
        let slave = Arc::new(Slave::new(store, addr.to_string()));
        slave.connect().await.unwrap();

        let (_socket, _) = listener.accept().await.unwrap();

        let runner = Arc::clone(&slave);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        slave.close();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_without_connect_fails() {
        let store = Arc::new(Store::new(0));
        let slave = Slave::new(store, "127.0.0.1:1");

        assert!(matches!(
            slave.run().await,
            Err(ReplicationError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_replication() {
        // A real master this time
        let master_store = Arc::new(Store::new(0));
        let master = Arc::new(Master::with_heartbeat(
            Arc::clone(&master_store),
            HeartbeatConfig {
                interval: Duration::from_millis(100),
                max_missed: 3,
            },
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&master).serve(listener));

        // Seed before the replica attaches: covered by the state transfer
        master.set("seed", "value", Duration::ZERO);

        let slave_store = Arc::new(Store::new(0));
        let slave = Arc::new(Slave::new(Arc::clone(&slave_store), addr.to_string()));
        slave.connect().await.unwrap();

        let runner = Arc::clone(&slave);
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slave.get("seed"), Some("value".to_string()));

        // Live stream after attach
        master.set("live", "1", Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slave.get("live"), Some("1".to_string()));

        master.delete("live");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slave.get("live"), None);

        master.flush();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slave.get("seed"), None);
        assert_eq!(slave_store.len(), 0);

        // The slave answered heartbeats all along, so it is still attached
        assert_eq!(master.replica_count(), 1);
    }
}
