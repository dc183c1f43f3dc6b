use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::socket::endpoints;

/// Runtime configuration shared by the store, pairing and connection layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Path to the SQLite database holding the session record.
    pub database_path: String,
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// `Origin` header sent with the WebSocket upgrade.
    pub origin: String,
    /// Display name advertised to the server.
    pub push_name: Option<String>,
    /// Upper bound on a single connect + handshake attempt.
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
    /// First reconnect delay.
    #[serde(with = "duration_secs")]
    pub backoff_initial: Duration,
    /// Reconnect delays never exceed this.
    #[serde(with = "duration_secs")]
    pub backoff_max: Duration,
    /// Fraction of the delay added as random jitter (0.0 to 1.0).
    pub backoff_jitter: f64,
    /// Lifetime of the first pairing ticket.
    #[serde(with = "duration_secs")]
    pub first_ticket_ttl: Duration,
    /// Lifetime of every following pairing ticket.
    #[serde(with = "duration_secs")]
    pub ticket_ttl: Duration,
    /// How many times ticket generation is tried before pairing gives up.
    pub pairing_ref_attempts: u32,
    /// Bound of the event dispatcher's buffer.
    pub dispatcher_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: "./whatsapp.db".into(),
            endpoint: endpoints::MAIN.into(),
            origin: endpoints::ORIGIN.into(),
            push_name: None,
            handshake_timeout: Duration::from_secs(20),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backoff_jitter: 0.2,
            first_ticket_ttl: Duration::from_secs(60),
            ticket_ttl: Duration::from_secs(20),
            pairing_ref_attempts: 3,
            dispatcher_capacity: 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ClientConfig {
    /// Load a JSON config file; absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Override the database path.
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Override the WebSocket endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the push name advertised to the server.
    pub fn with_push_name(mut self, push_name: impl Into<String>) -> Self {
        self.push_name = Some(push_name.into());
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Override reconnect backoff bounds and jitter.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, jitter: f64) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self.backoff_jitter = jitter;
        self
    }

    /// Override pairing ticket lifetimes.
    pub fn with_ticket_ttls(mut self, first: Duration, rest: Duration) -> Self {
        self.first_ticket_ttl = first;
        self.ticket_ttl = rest;
        self
    }

    pub fn with_dispatcher_capacity(mut self, capacity: usize) -> Self {
        self.dispatcher_capacity = capacity;
        self
    }
}

/// Durations as (fractional) seconds in config files.
mod duration_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
