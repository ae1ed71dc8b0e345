//! Replication Wire Protocol
//!
//! Line-oriented text codec for the operation stream between a master and
//! its replicas. One operation per `\n`-terminated line, fields separated
//! by whitespace:
//!
//! ```text
//! SET    <key> <value> <ttl_ms> <timestamp>
//! DELETE <key> <timestamp>
//! FLUSH  <timestamp>
//! PING   <timestamp>
//! PONG   <timestamp>
//! ```
//!
//! `ttl_ms` is the time-to-live in milliseconds, 0 meaning no expiry.
//! `timestamp` is the sender's wall-clock Unix second at issuance; replicas
//! use it to shorten a TTL by however long the operation spent in transit.
//!
//! Known limitation, kept for wire compatibility: there is no escaping, so
//! keys and values must not contain whitespace. The command layer enforces
//! this for keys; values with spaces survive the client protocol but not
//! the replication stream.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors that can occur while parsing an operation line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line has fewer than two whitespace-separated tokens
    #[error("malformed operation line")]
    Malformed,

    /// An operation is missing required fields
    #[error("{op} requires {required} fields")]
    MissingFields { op: &'static str, required: usize },

    /// A numeric field failed to parse
    #[error("invalid integer field: {0}")]
    InvalidInteger(String),
}

/// A single record in the replication stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Store a key, with `ttl` zero meaning no expiry
    Set {
        key: String,
        value: String,
        ttl: Duration,
        timestamp: i64,
    },

    /// Remove a key
    Delete { key: String, timestamp: i64 },

    /// Remove every key
    Flush { timestamp: i64 },

    /// Heartbeat probe from the master
    Ping { timestamp: i64 },

    /// Heartbeat answer from a replica, echoing the probe's timestamp
    Pong { timestamp: i64 },

    /// An operation this version doesn't know; receivers ignore it
    Unknown { kind: String },
}

impl Operation {
    /// Serializes the operation to its wire format, newline included.
    pub fn serialize(&self) -> String {
        match self {
            Operation::Set {
                key,
                value,
                ttl,
                timestamp,
            } => format!("SET {} {} {} {}\n", key, value, ttl.as_millis(), timestamp),
            Operation::Delete { key, timestamp } => format!("DELETE {} {}\n", key, timestamp),
            Operation::Flush { timestamp } => format!("FLUSH {}\n", timestamp),
            Operation::Ping { timestamp } => format!("PING {}\n", timestamp),
            Operation::Pong { timestamp } => format!("PONG {}\n", timestamp),
            Operation::Unknown { kind } => format!("{}\n", kind),
        }
    }
}

/// Parses one operation line (without or with its trailing newline).
///
/// Unknown leading tokens parse to [`Operation::Unknown`] rather than an
/// error, so an old replica can skip operations a newer master sends.
pub fn parse_operation(line: &str) -> Result<Operation, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ParseError::Malformed);
    }

    match parts[0] {
        "SET" => {
            if parts.len() < 5 {
                return Err(ParseError::MissingFields {
                    op: "SET",
                    required: 5,
                });
            }
            let ttl_ms: u64 = parse_int(parts[3])?;
            Ok(Operation::Set {
                key: parts[1].to_string(),
                value: parts[2].to_string(),
                ttl: Duration::from_millis(ttl_ms),
                timestamp: parse_int(parts[4])?,
            })
        }
        "DELETE" => {
            if parts.len() < 3 {
                return Err(ParseError::MissingFields {
                    op: "DELETE",
                    required: 3,
                });
            }
            Ok(Operation::Delete {
                key: parts[1].to_string(),
                timestamp: parse_int(parts[2])?,
            })
        }
        "FLUSH" => Ok(Operation::Flush {
            timestamp: parse_int(parts[1])?,
        }),
        "PING" => Ok(Operation::Ping {
            timestamp: parse_int(parts[1])?,
        }),
        "PONG" => Ok(Operation::Pong {
            timestamp: parse_int(parts[1])?,
        }),
        other => Ok(Operation::Unknown {
            kind: other.to_string(),
        }),
    }
}

fn parse_int<T: std::str::FromStr>(field: &str) -> Result<T, ParseError> {
    field
        .parse()
        .map_err(|_| ParseError::InvalidInteger(field.to_string()))
}

/// Current wall-clock time as Unix seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
