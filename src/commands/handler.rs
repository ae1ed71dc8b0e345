//! Command Handler Module
//!
//! This module implements the client-facing commands for CinderKV. It takes
//! one request line, dispatches on the command word, executes against the
//! role-appropriate backend, and produces exactly one reply line.
//!
//! ## Supported Commands
//!
//! - `SET key value [EX seconds]` - Store a key, optionally with a TTL
//! - `GET key` - Retrieve a value
//! - `DEL key` - Delete a key
//! - `KEYS` - List all keys
//! - `SIZE` - Number of keys
//! - `FLUSH` - Clear all data
//! - `PING` - Test connection
//!
//! Command words are case-insensitive; keys are case-sensitive. Values may
//! contain spaces: everything after the key is the value, except a trailing
//! `EX <seconds>` pair, which sets the TTL.
//!
//! ## Roles
//!
//! A standalone node applies everything to its local store. A master
//! applies mutations through the replication layer so they fan out to
//! replicas. A slave serves reads only and refuses mutations, each with
//! its own error string (kept verbatim for client compatibility).

use std::sync::Arc;
use std::time::Duration;

use crate::replication::Master;
use crate::storage::Store;

/// Which part a node plays in a replication setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No replication; mutations apply locally only
    Standalone,
    /// Accepts replicas and broadcasts every mutation to them
    Master,
    /// Read-only follower of a master
    Slave,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(Role::Standalone),
            "master" => Ok(Role::Master),
            "slave" => Ok(Role::Slave),
            other => Err(format!(
                "invalid role '{other}' (expected master, slave or standalone)"
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Standalone => write!(f, "standalone"),
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// The role-specific target commands execute against.
#[derive(Clone)]
enum Backend {
    Standalone(Arc<Store>),
    Master(Arc<Master>),
    Slave(Arc<Store>),
}

impl Backend {
    /// The store reads go to, whatever the role.
    fn store(&self) -> &Arc<Store> {
        match self {
            Backend::Standalone(store) => store,
            Backend::Master(master) => master.store(),
            Backend::Slave(store) => store,
        }
    }
}

/// Translates client request lines into store or replication calls.
#[derive(Clone)]
pub struct CommandHandler {
    backend: Backend,
}

impl CommandHandler {
    /// Handler for a standalone node.
    pub fn standalone(store: Arc<Store>) -> Self {
        Self {
            backend: Backend::Standalone(store),
        }
    }

    /// Handler for a master; mutations go through the replication layer.
    pub fn master(master: Arc<Master>) -> Self {
        Self {
            backend: Backend::Master(master),
        }
    }

    /// Handler for a slave; mutations are refused.
    pub fn slave(store: Arc<Store>) -> Self {
        Self {
            backend: Backend::Slave(store),
        }
    }

    /// Executes one request line and returns the reply line (without its
    /// trailing newline). Blank lines produce no reply.
    pub fn execute(&self, line: &str) -> Option<String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let command = parts[0].to_uppercase();
        let reply = match command.as_str() {
            "PING" => "+PONG".to_string(),
            "SET" => self.cmd_set(&parts),
            "GET" => self.cmd_get(&parts),
            "DEL" => self.cmd_del(&parts),
            "KEYS" => self.cmd_keys(),
            "SIZE" => self.cmd_size(),
            "FLUSH" => self.cmd_flush(),
            _ => format!("ERR unknown command '{}'", command),
        };

        Some(reply)
    }

    /// SET key value [EX seconds]
    ///
    /// The value is every token after the key joined with single spaces,
    /// unless the line ends in `EX <n>`, which peels off as the TTL.
    fn cmd_set(&self, parts: &[&str]) -> String {
        if parts.len() < 3 {
            return "ERR wrong number of arguments for 'set' command".to_string();
        }

        let key = parts[1];
        let (value, ttl) = if parts.len() >= 5 && parts[parts.len() - 2].eq_ignore_ascii_case("EX")
        {
            let seconds = match parts[parts.len() - 1].parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => return "ERR invalid TTL value".to_string(),
            };
            (
                parts[2..parts.len() - 2].join(" "),
                Duration::from_secs(seconds as u64),
            )
        } else {
            (parts[2..].join(" "), Duration::ZERO)
        };

        match &self.backend {
            Backend::Standalone(store) => {
                store.set_with_ttl(key, value, ttl);
                "+OK".to_string()
            }
            Backend::Master(master) => {
                master.set(key, &value, ttl);
                "+OK".to_string()
            }
            Backend::Slave(_) => "+ERR: Slave is not allowed to set keys".to_string(),
        }
    }

    /// GET key
    fn cmd_get(&self, parts: &[&str]) -> String {
        if parts.len() < 2 {
            return "ERR wrong number of arguments for 'get' command".to_string();
        }

        match self.backend.store().get(parts[1]) {
            Some(value) => value,
            None => "(nil)".to_string(),
        }
    }

    /// DEL key
    fn cmd_del(&self, parts: &[&str]) -> String {
        if parts.len() < 2 {
            return "ERR wrong number of arguments for 'del' command".to_string();
        }

        match &self.backend {
            Backend::Standalone(store) => {
                if store.delete(parts[1]) {
                    "+OK".to_string()
                } else {
                    "+ERR: Key not found".to_string()
                }
            }
            Backend::Master(master) => {
                master.delete(parts[1]);
                "+OK".to_string()
            }
            Backend::Slave(_) => "+ERR: Slave is not allowed to delete keys".to_string(),
        }
    }

    /// KEYS
    ///
    /// Comma-space separated list. Not safely parseable if a key contains
    /// a comma; kept this way for client compatibility.
    fn cmd_keys(&self) -> String {
        let keys = self.backend.store().keys();
        if keys.is_empty() {
            "(empty)".to_string()
        } else {
            keys.join(", ")
        }
    }

    /// SIZE
    fn cmd_size(&self) -> String {
        self.backend.store().len().to_string()
    }

    /// FLUSH
    fn cmd_flush(&self) -> String {
        match &self.backend {
            Backend::Standalone(store) => {
                store.flush();
                "+OK".to_string()
            }
            Backend::Master(master) => {
                master.flush();
                "+OK".to_string()
            }
            Backend::Slave(_) => "+ERR: Slave is not allowed to flush the cache".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standalone() -> (CommandHandler, Arc<Store>) {
        let store = Arc::new(Store::new(0));
        (CommandHandler::standalone(Arc::clone(&store)), store)
    }

    #[test]
    fn test_ping() {
        let (handler, _) = standalone();
        assert_eq!(handler.execute("PING"), Some("+PONG".to_string()));
        assert_eq!(handler.execute("ping"), Some("+PONG".to_string()));
    }

    #[test]
    fn test_blank_line_has_no_reply() {
        let (handler, _) = standalone();
        assert_eq!(handler.execute(""), None);
        assert_eq!(handler.execute("   "), None);
    }

    #[test]
    fn test_set_and_get() {
        let (handler, _) = standalone();

        assert_eq!(handler.execute("SET name cinder"), Some("+OK".to_string()));
        assert_eq!(handler.execute("GET name"), Some("cinder".to_string()));
        assert_eq!(handler.execute("GET missing"), Some("(nil)".to_string()));
    }

    #[test]
    fn test_set_value_with_spaces() {
        let (handler, _) = standalone();

        handler.execute("SET greeting hello wide world");
        assert_eq!(
            handler.execute("GET greeting"),
            Some("hello wide world".to_string())
        );
    }

    #[test]
    fn test_set_with_ttl() {
        let (handler, store) = standalone();

        assert_eq!(
            handler.execute("SET session token EX 60"),
            Some("+OK".to_string())
        );
        let (value, ttl) = store.get_with_ttl("session").unwrap();
        assert_eq!(value, "token");
        assert!(ttl > Duration::from_secs(50));
    }

    #[test]
    fn test_set_spaced_value_with_ttl() {
        let (handler, store) = standalone();

        handler.execute("SET k two words EX 60");
        let (value, _) = store.get_with_ttl("k").unwrap();
        assert_eq!(value, "two words");
    }

    #[test]
    fn test_set_ex_is_case_insensitive() {
        let (handler, store) = standalone();

        handler.execute("SET k v ex 60");
        let (_, ttl) = store.get_with_ttl("k").unwrap();
        assert!(ttl > Duration::ZERO);
    }

    #[test]
    fn test_set_short_line_keeps_ex_literal() {
        let (handler, _) = standalone();

        // Only four tokens, so "EX 5" is part of the value
        handler.execute("SET k EX 5");
        assert_eq!(handler.execute("GET k"), Some("EX 5".to_string()));
    }

    #[test]
    fn test_set_invalid_ttl() {
        let (handler, _) = standalone();

        assert_eq!(
            handler.execute("SET k v EX 0"),
            Some("ERR invalid TTL value".to_string())
        );
        assert_eq!(
            handler.execute("SET k v EX -3"),
            Some("ERR invalid TTL value".to_string())
        );
        assert_eq!(
            handler.execute("SET k v EX soon"),
            Some("ERR invalid TTL value".to_string())
        );
    }

    #[test]
    fn test_wrong_argument_counts() {
        let (handler, _) = standalone();

        assert_eq!(
            handler.execute("SET k"),
            Some("ERR wrong number of arguments for 'set' command".to_string())
        );
        assert_eq!(
            handler.execute("GET"),
            Some("ERR wrong number of arguments for 'get' command".to_string())
        );
        assert_eq!(
            handler.execute("DEL"),
            Some("ERR wrong number of arguments for 'del' command".to_string())
        );
    }

    #[test]
    fn test_del() {
        let (handler, _) = standalone();

        handler.execute("SET k v");
        assert_eq!(handler.execute("DEL k"), Some("+OK".to_string()));
        assert_eq!(
            handler.execute("DEL k"),
            Some("+ERR: Key not found".to_string())
        );
    }

    #[test]
    fn test_keys_and_size() {
        let (handler, _) = standalone();

        assert_eq!(handler.execute("KEYS"), Some("(empty)".to_string()));
        assert_eq!(handler.execute("SIZE"), Some("0".to_string()));

        handler.execute("SET a 1");
        handler.execute("SET b 2");

        let keys = handler.execute("KEYS").unwrap();
        let mut listed: Vec<&str> = keys.split(", ").collect();
        listed.sort();
        assert_eq!(listed, vec!["a", "b"]);
        assert_eq!(handler.execute("SIZE"), Some("2".to_string()));
    }

    #[test]
    fn test_flush() {
        let (handler, _) = standalone();

        handler.execute("SET a 1");
        assert_eq!(handler.execute("FLUSH"), Some("+OK".to_string()));
        assert_eq!(handler.execute("SIZE"), Some("0".to_string()));
    }

    #[test]
    fn test_unknown_command() {
        let (handler, _) = standalone();

        assert_eq!(
            handler.execute("frobnicate k"),
            Some("ERR unknown command 'FROBNICATE'".to_string())
        );
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let (handler, _) = standalone();

        handler.execute("SET Key upper");
        handler.execute("SET key lower");
        assert_eq!(handler.execute("GET Key"), Some("upper".to_string()));
        assert_eq!(handler.execute("GET key"), Some("lower".to_string()));
    }

    #[test]
    fn test_slave_refuses_mutations() {
        let store = Arc::new(Store::new(0));
        store.set("existing", "value");
        let handler = CommandHandler::slave(Arc::clone(&store));

        assert_eq!(
            handler.execute("SET k v"),
            Some("+ERR: Slave is not allowed to set keys".to_string())
        );
        assert_eq!(
            handler.execute("DEL existing"),
            Some("+ERR: Slave is not allowed to delete keys".to_string())
        );
        assert_eq!(
            handler.execute("FLUSH"),
            Some("+ERR: Slave is not allowed to flush the cache".to_string())
        );

        // Reads still work
        assert_eq!(handler.execute("GET existing"), Some("value".to_string()));
        assert_eq!(handler.execute("SIZE"), Some("1".to_string()));
    }

    #[test]
    fn test_master_mutations_apply_locally() {
        let store = Arc::new(Store::new(0));
        let master = Arc::new(Master::new(Arc::clone(&store)));
        let handler = CommandHandler::master(master);

        assert_eq!(handler.execute("SET k v"), Some("+OK".to_string()));
        assert_eq!(handler.execute("GET k"), Some("v".to_string()));

        // A master's DEL replies +OK whether or not the key existed
        assert_eq!(handler.execute("DEL k"), Some("+OK".to_string()));
        assert_eq!(handler.execute("DEL k"), Some("+OK".to_string()));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("master".parse::<Role>(), Ok(Role::Master));
        assert_eq!("SLAVE".parse::<Role>(), Ok(Role::Slave));
        assert_eq!("Standalone".parse::<Role>(), Ok(Role::Standalone));
        assert!("primary".parse::<Role>().is_err());
    }
}
