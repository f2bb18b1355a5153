// Shared helpers for timestamps, log naming and rate limiting.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::constants::{LOG_FILE_PREFIX, LOG_FILE_TIME_FORMAT};

pub fn now_unix_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}_{}.csv", LOG_FILE_PREFIX, started.format(LOG_FILE_TIME_FORMAT))
}

/// Lets an event through at most once per interval.
#[derive(Clone, Debug)]
pub struct RateLimit {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimit {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}
