// One tick's derived telemetry snapshot.
// Invariants: throttle, brake and fuel_pct lie in [0, 1]; session_remain_s and incidents are never negative.
// Values are kept unrounded; rounding happens only in wire and log encoders.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    pub sequence: u64,
    pub rpm: f64,
    pub gear: i32,
    pub throttle: f64,
    pub brake: f64,
    pub steer_ratio: f64,
    pub session_remain_s: f64,
    pub incidents: i32,
    pub fuel_l: f64,
    pub fuel_pct: f64,
    pub speed_kmh: f64,
    pub lap: i32,
    pub position: i32,
    pub class_position: i32,
    pub lap_current_s: f64,
    pub lap_last_s: f64,
    pub lap_best_s: f64,
    pub is_replay: bool,
}
