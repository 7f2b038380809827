use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub listener: ListenerConfig,
    pub dialer: DialerConfig,
    pub metrics: MetricsConfig,
}

/// Server side: where to accept connections and how to supervise them.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    pub listen_address: String,
    /// Period between PING requests; also the deadline for each answer.
    pub heartbeat_interval_ms: u64,
    /// Number of admission tokens, i.e. concurrently supervised connections.
    pub max_conns: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8081".to_string(),
            heartbeat_interval_ms: 200,
            max_conns: 5,
        }
    }
}

impl ListenerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Client side: how often to dial and how long each trial lives.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DialerConfig {
    pub target_address: String,
    pub dial_interval_ms: u64,
    pub min_ttl_ms: u64,
    pub max_ttl_ms: u64,
    /// Probability in `[0, 1]` that a trial abandons its connection right after dialing.
    pub bad_dial_chance: f64,
    /// How long an abandoned connection stays open (unread) before it is dropped.
    /// Must exceed two listener heartbeat intervals.
    pub abandon_linger_ms: u64,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            target_address: "127.0.0.1:8081".to_string(),
            dial_interval_ms: 200,
            min_ttl_ms: 1_000,
            max_ttl_ms: 3_000,
            bad_dial_chance: 0.5,
            abandon_linger_ms: 5_000,
        }
    }
}

impl DialerConfig {
    pub fn dial_interval(&self) -> Duration {
        Duration::from_millis(self.dial_interval_ms)
    }

    pub fn abandon_linger(&self) -> Duration {
        Duration::from_millis(self.abandon_linger_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8082,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeat,

    #[error("max_conns must be at least 1")]
    ZeroMaxConns,

    #[error("dial interval must be greater than zero")]
    ZeroDialInterval,

    #[error("min_ttl_ms ({min}) is greater than max_ttl_ms ({max})")]
    InvertedTtl { min: u64, max: u64 },

    #[error("bad_dial_chance must be within [0, 1], got {0}")]
    BadDialChance(f64),

    #[error("abandon_linger_ms ({linger}) must exceed two heartbeat intervals ({min})")]
    LingerTooShort { linger: u64, min: u64 },
}

impl Config {
    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.listener.max_conns == 0 {
            return Err(ConfigError::ZeroMaxConns);
        }
        if self.dialer.dial_interval_ms == 0 {
            return Err(ConfigError::ZeroDialInterval);
        }
        if self.dialer.min_ttl_ms > self.dialer.max_ttl_ms {
            return Err(ConfigError::InvertedTtl {
                min: self.dialer.min_ttl_ms,
                max: self.dialer.max_ttl_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.dialer.bad_dial_chance) {
            return Err(ConfigError::BadDialChance(self.dialer.bad_dial_chance));
        }
        // An abandoned socket must outlive the first PING and its deadline,
        // otherwise the server sees EOF instead of a silent peer.
        let min_linger = self.listener.heartbeat_interval_ms.saturating_mul(2);
        if self.dialer.abandon_linger_ms <= min_linger {
            return Err(ConfigError::LingerTooShort {
                linger: self.dialer.abandon_linger_ms,
                min: min_linger,
            });
        }
        Ok(())
    }
}
