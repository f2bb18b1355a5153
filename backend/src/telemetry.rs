// Console status line for the running bridge.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::udp::DispatchReport;
use crate::utils::RateLimit;
use telemetry_core::model::Sample;

pub struct StatusReporter {
    limit: RateLimit,
}

impl StatusReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            limit: RateLimit::new(interval),
        }
    }

    /// Logs one status line if the interval has elapsed; returns whether it did.
    pub fn maybe_report(&mut self, sample: &Sample, report: &DispatchReport, now: Instant) -> bool {
        if !self.limit.ready(now) {
            return false;
        }
        info!(
            seq = sample.sequence,
            rpm = %format!("{:.0}", sample.rpm),
            gear = sample.gear,
            speed_kmh = %format!("{:.1}", sample.speed_kmh),
            fuel_l = %format!("{:.2}", sample.fuel_l),
            fuel_pct = %format!("{:.1}", sample.fuel_pct * 100.0),
            incidents = sample.incidents,
            remain_s = %format!("{:.1}", sample.session_remain_s),
            lap = sample.lap,
            pos = sample.position,
            class_pos = sample.class_position,
            lap_cur = %format!("{:.3}", sample.lap_current_s),
            lap_last = %format!("{:.3}", sample.lap_last_s),
            lap_best = %format!("{:.3}", sample.lap_best_s),
            throttle = %format!("{:.2}", sample.throttle),
            brake = %format!("{:.2}", sample.brake),
            replay = sample.is_replay,
            sent = report.sent,
            unresolved = report.unresolved,
            failed = report.failed,
            "telemetry status"
        );
        true
    }
}
