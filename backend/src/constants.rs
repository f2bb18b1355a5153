// Shared constants for loop timing, destinations, and paths.

pub const DEFAULT_DEST_HOST: &str = "192.168.1.60";
pub const DEFAULT_DEST_PORT: u16 = 5005;
pub const SEND_HZ: f64 = 20.0;
pub const MIN_SEND_HZ: f64 = 0.1;
pub const MAX_SEND_HZ: f64 = 1000.0;
pub const RESOLVE_INTERVAL_SECS: u64 = 5;
pub const WAITING_BACKOFF_MS: u64 = 500;
pub const STATUS_INTERVAL_MS: u64 = 1_000;
pub const LOG_FILE_PREFIX: &str = "iracing_telemetry";
pub const LOG_FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const IRSDK_MEM_MAP_NAME: &str = "Local\\IRSDKMemMapFileName";
