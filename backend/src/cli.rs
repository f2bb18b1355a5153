// Command-line surface with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::app::{Config, ConfigError, DestinationSpec};
use crate::constants::{DEFAULT_DEST_PORT, RESOLVE_INTERVAL_SECS, SEND_HZ};

/// iRacing -> UDP (ESP32/Pi) bridge with optional CSV logging
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Live-only mode: do not write CSV to disk
    #[arg(short = 'l', long = "live", env = "IRSDK_BRIDGE_LIVE")]
    pub live: bool,

    /// UDP destination "host" or "host:port". Can be used multiple times.
    #[arg(long = "dest", value_name = "HOST[:PORT]")]
    pub dest: Vec<String>,

    /// Port used for destinations given without one
    #[arg(long, env = "IRSDK_BRIDGE_PORT", default_value_t = DEFAULT_DEST_PORT)]
    pub port: u16,

    /// Send rate in Hz
    #[arg(long, env = "IRSDK_BRIDGE_HZ", default_value_t = SEND_HZ)]
    pub hz: f64,

    /// Seconds a resolved destination address is reused before re-resolving
    #[arg(long, env = "IRSDK_BRIDGE_RESOLVE_SECS", default_value_t = RESOLVE_INTERVAL_SECS)]
    pub resolve_interval_secs: u64,

    /// Directory for the per-run CSV log
    #[arg(long, env = "IRSDK_BRIDGE_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Replay a JSON-lines telemetry capture instead of reading the simulator
    #[arg(long, env = "IRSDK_BRIDGE_REPLAY", value_name = "PATH")]
    pub replay: Option<PathBuf>,
}

impl Cli {
    pub fn to_config(&self) -> Result<Config, ConfigError> {
        let destinations = self
            .dest
            .iter()
            .map(|dest| DestinationSpec::parse(dest, self.port))
            .collect::<Result<Vec<_>, _>>()?;

        Config {
            destinations,
            send_hz: self.hz,
            resolve_interval: Duration::from_secs(self.resolve_interval_secs),
            log_dir: (!self.live).then(|| self.log_dir.clone()),
            ..Config::default()
        }
        .validate()
    }
}
