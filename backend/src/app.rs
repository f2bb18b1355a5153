// Bridge configuration and destination parsing.
// Invariants: a validated Config always has at least one destination and a send rate within [MIN_SEND_HZ, MAX_SEND_HZ].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_DEST_HOST, DEFAULT_DEST_PORT, MAX_SEND_HZ, MIN_SEND_HZ, RESOLVE_INTERVAL_SECS,
    SEND_HZ, STATUS_INTERVAL_MS, WAITING_BACKOFF_MS,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("destination {0:?} has an empty host")]
    EmptyHost(String),
    #[error("destination {0:?} has an invalid port")]
    InvalidPort(String),
    #[error("send rate {0} Hz is out of range")]
    InvalidRate(f64),
    #[error("resolve interval must be at least one second")]
    InvalidResolveInterval,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationSpec {
    pub host: String,
    pub port: u16,
}

impl DestinationSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Accepts `host`, `host:port`, `[v6]` and `[v6]:port`. A bare IPv6
    /// literal is taken as a host without a port.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, "")) => (host, None),
                Some((host, tail)) => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(ConfigError::InvalidPort(input.to_string())),
                },
                None => return Err(ConfigError::EmptyHost(input.to_string())),
            }
        } else if trimmed.matches(':').count() > 1 {
            (trimmed, None)
        } else {
            match trimmed.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost(input.to_string()));
        }
        let port = match port {
            Some(port) => match port.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(ConfigError::InvalidPort(input.to_string())),
            },
            None => default_port,
        };
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for DestinationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub destinations: Vec<DestinationSpec>,
    pub send_hz: f64,
    pub resolve_interval: Duration,
    pub waiting_backoff: Duration,
    pub status_interval: Duration,
    /// Directory for the per-run CSV log; `None` is live-only mode.
    pub log_dir: Option<PathBuf>,
    pub bind_addr: IpAddr,
}

impl Config {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(MIN_SEND_HZ..=MAX_SEND_HZ).contains(&self.send_hz) {
            return Err(ConfigError::InvalidRate(self.send_hz));
        }
        if self.resolve_interval < Duration::from_secs(1) {
            return Err(ConfigError::InvalidResolveInterval);
        }
        let mut config = self;
        if config.destinations.is_empty() {
            config.destinations = vec![default_destination()];
        }
        Ok(config)
    }

    /// Tick period for the send rate. An unvalidated rate that has no
    /// representable period falls back to the slowest allowed one.
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.send_hz)
            .unwrap_or_else(|_| Duration::from_secs_f64(1.0 / MIN_SEND_HZ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destinations: vec![default_destination()],
            send_hz: SEND_HZ,
            resolve_interval: Duration::from_secs(RESOLVE_INTERVAL_SECS),
            waiting_backoff: Duration::from_millis(WAITING_BACKOFF_MS),
            status_interval: Duration::from_millis(STATUS_INTERVAL_MS),
            log_dir: Some(PathBuf::from(".")),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

pub fn default_destination() -> DestinationSpec {
    DestinationSpec::new(DEFAULT_DEST_HOST, DEFAULT_DEST_PORT)
}
