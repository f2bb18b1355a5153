// Per-tick sample derivation from raw simulator fields.
// Invariants: pure given the reader's outputs; nothing is carried from one tick to the next.

use crate::model::Sample;
use crate::reader::{lookup, read_indexed, read_scalar};
use crate::source::TelemetrySource;
use crate::value::FromValue;

pub mod keys {
    pub const IS_REPLAY_PLAYING: &str = "IsReplayPlaying";
    pub const PLAYER_CAR_IDX: &str = "PlayerCarIdx";
    pub const RPM: &str = "RPM";
    pub const GEAR: &str = "Gear";
    pub const THROTTLE: &str = "Throttle";
    pub const BRAKE: &str = "Brake";
    pub const STEERING_WHEEL_ANGLE: &str = "SteeringWheelAngle";
    pub const STEERING_WHEEL_ANGLE_MAX: &str = "SteeringWheelAngleMax";
    pub const SESSION_TIME_REMAIN: &str = "SessionTimeRemain";
    pub const SESSION_TIME_TOTAL: &str = "SessionTimeTotal";
    pub const SESSION_TIME: &str = "SessionTime";
    pub const FUEL_LEVEL: &str = "FuelLevel";
    pub const FUEL_LEVEL_PCT: &str = "FuelLevelPct";
    pub const SPEED: &str = "Speed";
    pub const LAP: &str = "Lap";
    pub const CAR_IDX_LAP: &str = "CarIdxLap";
    pub const PLAYER_CAR_POSITION: &str = "PlayerCarPosition";
    pub const CAR_IDX_POSITION: &str = "CarIdxPosition";
    pub const PLAYER_CAR_CLASS_POSITION: &str = "PlayerCarClassPosition";
    pub const CAR_IDX_CLASS_POSITION: &str = "CarIdxClassPosition";
    pub const LAP_CURRENT_LAP_TIME: &str = "LapCurrentLapTime";
    pub const LAP_LAST_LAP_TIME: &str = "LapLastLapTime";
    pub const CAR_IDX_LAST_LAP_TIME: &str = "CarIdxLastLapTime";
    pub const LAP_BEST_LAP_TIME: &str = "LapBestLapTime";
    pub const CAR_IDX_BEST_LAP_TIME: &str = "CarIdxBestLapTime";
}

/// Incident counters in priority order; the first readable one wins.
pub const INCIDENT_KEYS: [&str; 3] = [
    "PlayerCarMyIncidentCount",
    "PlayerCarTeamIncidentCount",
    "PlayerCarIncidentCount",
];

/// Raw fractions above this magnitude are taken to be percentages.
pub const PERCENT_SCALE_THRESHOLD: f64 = 1.5;
pub const MS_TO_KMH: f64 = 3.6;

/// When a player-scoped value counts as "not set" by the simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unset {
    /// Exactly zero. Used for counters where the feed writes 0 while a replay is playing.
    Zero,
    /// Zero or negative. Lap times are never legitimately <= 0 during an active lap.
    NonPositive,
}

impl Unset {
    pub fn matches(self, value: f64) -> bool {
        match self {
            Unset::Zero => value == 0.0,
            Unset::NonPositive => value <= 0.0,
        }
    }
}

/// Per-field fallback: a player-scoped key, and the per-car array consulted
/// at the player's car index when the player-scoped value is unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub primary: &'static str,
    pub per_car: Option<&'static str>,
    pub unset: Unset,
}

pub const LAP: FallbackPolicy = FallbackPolicy {
    primary: keys::LAP,
    per_car: Some(keys::CAR_IDX_LAP),
    unset: Unset::Zero,
};

pub const POSITION: FallbackPolicy = FallbackPolicy {
    primary: keys::PLAYER_CAR_POSITION,
    per_car: Some(keys::CAR_IDX_POSITION),
    unset: Unset::Zero,
};

pub const CLASS_POSITION: FallbackPolicy = FallbackPolicy {
    primary: keys::PLAYER_CAR_CLASS_POSITION,
    per_car: Some(keys::CAR_IDX_CLASS_POSITION),
    unset: Unset::Zero,
};

// The feed has no per-car current lap time array.
pub const LAP_CURRENT: FallbackPolicy = FallbackPolicy {
    primary: keys::LAP_CURRENT_LAP_TIME,
    per_car: None,
    unset: Unset::NonPositive,
};

pub const LAP_LAST: FallbackPolicy = FallbackPolicy {
    primary: keys::LAP_LAST_LAP_TIME,
    per_car: Some(keys::CAR_IDX_LAST_LAP_TIME),
    unset: Unset::NonPositive,
};

pub const LAP_BEST: FallbackPolicy = FallbackPolicy {
    primary: keys::LAP_BEST_LAP_TIME,
    per_car: Some(keys::CAR_IDX_BEST_LAP_TIME),
    unset: Unset::NonPositive,
};

/// Builds one sample from the current source state.
///
/// A missing `PlayerCarIdx` is taken as -1, which disables every per-car
/// fallback. Older bridges assumed car 0 instead and could report another
/// car's lap, position and lap times in that case.
pub fn derive_sample<S>(source: &S, sequence: u64) -> Sample
where
    S: TelemetrySource + ?Sized,
{
    let is_replay = read_scalar(source, keys::IS_REPLAY_PLAYING, false);
    let player_idx = read_scalar(source, keys::PLAYER_CAR_IDX, -1i32);

    let steer_angle = read_scalar(source, keys::STEERING_WHEEL_ANGLE, 0.0);
    let steer_max = lookup(source, keys::STEERING_WHEEL_ANGLE_MAX);

    let session_remain_s = session_time_remaining(
        lookup(source, keys::SESSION_TIME_REMAIN),
        read_scalar(source, keys::SESSION_TIME_TOTAL, 0.0),
        read_scalar(source, keys::SESSION_TIME, 0.0),
    );

    Sample {
        sequence,
        rpm: read_scalar(source, keys::RPM, 0.0),
        gear: read_scalar(source, keys::GEAR, 0),
        throttle: clamp_unit(read_scalar(source, keys::THROTTLE, 0.0)),
        brake: clamp_unit(read_scalar(source, keys::BRAKE, 0.0)),
        steer_ratio: steering_ratio(steer_angle, steer_max),
        session_remain_s,
        incidents: incident_count(source),
        fuel_l: read_scalar(source, keys::FUEL_LEVEL, 0.0),
        fuel_pct: normalize_fraction(read_scalar(source, keys::FUEL_LEVEL_PCT, 0.0)),
        speed_kmh: read_scalar(source, keys::SPEED, 0.0) * MS_TO_KMH,
        lap: resolve_field(source, &LAP, player_idx, 0),
        position: resolve_field(source, &POSITION, player_idx, 0),
        class_position: resolve_field(source, &CLASS_POSITION, player_idx, 0),
        lap_current_s: resolve_field(source, &LAP_CURRENT, player_idx, 0.0),
        lap_last_s: resolve_field(source, &LAP_LAST, player_idx, 0.0),
        lap_best_s: resolve_field(source, &LAP_BEST, player_idx, 0.0),
        is_replay,
    }
}

/// Accepts either a 0..1 fraction or a 0..100 percentage and returns a fraction in [0, 1].
pub fn normalize_fraction(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let fraction = if raw.abs() > PERCENT_SCALE_THRESHOLD {
        raw / 100.0
    } else {
        raw
    };
    fraction.clamp(0.0, 1.0)
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn steering_ratio(angle: f64, max_angle: Option<f64>) -> f64 {
    match max_angle {
        Some(max_angle) if max_angle != 0.0 => angle / max_angle,
        _ => 0.0,
    }
}

pub fn session_time_remaining(remaining: Option<f64>, total: f64, current: f64) -> f64 {
    if let Some(remaining) = remaining.filter(|value| *value > 0.0) {
        return remaining;
    }
    if total > 0.0 && current >= 0.0 {
        return (total - current).max(0.0);
    }
    0.0
}

pub fn incident_count<S>(source: &S) -> i32
where
    S: TelemetrySource + ?Sized,
{
    INCIDENT_KEYS
        .iter()
        .find_map(|key| lookup::<i32, _>(source, key))
        .map(|count| count.max(0))
        .unwrap_or(0)
}

/// Reads the player-scoped value and, when it is unset and the player's car
/// index is known, replaces it with the per-car array entry at that index.
pub fn resolve_field<T, S>(source: &S, policy: &FallbackPolicy, player_idx: i32, default: T) -> T
where
    T: FromValue + Copy + Into<f64>,
    S: TelemetrySource + ?Sized,
{
    let value = read_scalar(source, policy.primary, default);
    match policy.per_car {
        Some(per_car) if player_idx >= 0 && policy.unset.matches(value.into()) => {
            read_indexed(source, per_car, i64::from(player_idx), value)
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MapSource;

    #[test]
    fn fraction_stays_in_unit_range() {
        for raw in [-250.0, -1.0, 0.0, 0.3, 1.0, 1.5, 1.51, 55.0, 100.0, 180.0, f64::NAN] {
            let value = normalize_fraction(raw);
            assert!((0.0..=1.0).contains(&value), "raw {raw} -> {value}");
        }
    }

    #[test]
    fn percentage_and_fraction_agree() {
        for step in 2..=100 {
            let fraction = f64::from(step) / 100.0;
            let diff = normalize_fraction(fraction * 100.0) - normalize_fraction(fraction);
            assert!(diff.abs() < 1e-9, "fraction {fraction}");
        }
        assert!((normalize_fraction(55.0) - 0.55).abs() < 1e-12);
    }

    #[test]
    fn steering_ratio_needs_nonzero_max() {
        assert_eq!(steering_ratio(1.0, Some(4.0)), 0.25);
        assert_eq!(steering_ratio(1.0, Some(0.0)), 0.0);
        assert_eq!(steering_ratio(1.0, None), 0.0);
    }

    #[test]
    fn session_remaining_is_never_negative() {
        let directs = [None, Some(-5.0), Some(0.0), Some(120.0)];
        let totals = [-10.0, 0.0, 600.0];
        let currents = [-1.0, 0.0, 300.0, 900.0];
        for direct in directs {
            for total in totals {
                for current in currents {
                    let remain = session_time_remaining(direct, total, current);
                    assert!(remain >= 0.0, "{direct:?} {total} {current} -> {remain}");
                }
            }
        }
    }

    #[test]
    fn session_remaining_prefers_direct_field() {
        assert_eq!(session_time_remaining(Some(120.0), 600.0, 300.0), 120.0);
        assert_eq!(session_time_remaining(Some(0.0), 600.0, 250.0), 350.0);
        assert_eq!(session_time_remaining(None, 600.0, 900.0), 0.0);
        assert_eq!(session_time_remaining(None, 0.0, 10.0), 0.0);
    }

    #[test]
    fn incidents_follow_priority_order() {
        let source = MapSource::new()
            .with("PlayerCarTeamIncidentCount", 6)
            .with("PlayerCarIncidentCount", 9);
        assert_eq!(incident_count(&source), 6);

        let source = MapSource::new()
            .with("PlayerCarMyIncidentCount", "n/a")
            .with("PlayerCarTeamIncidentCount", "4");
        assert_eq!(incident_count(&source), 4);

        assert_eq!(incident_count(&MapSource::new()), 0);
    }

    #[test]
    fn zeroed_position_uses_per_car_array() {
        let source = MapSource::new()
            .with("PlayerCarIdx", 2)
            .with("PlayerCarPosition", 0)
            .with("CarIdxPosition", vec![1, 3, 4, 2]);
        let sample = derive_sample(&source, 0);
        assert_eq!(sample.position, 4);
    }

    #[test]
    fn set_value_never_consults_array() {
        let source = MapSource::new()
            .with("PlayerCarIdx", 1)
            .with("Lap", 7)
            .with("CarIdxLap", vec![2, 3])
            .with("LapBestLapTime", 88.5)
            .with("CarIdxBestLapTime", vec![90.0, 91.0]);
        let sample = derive_sample(&source, 0);
        assert_eq!(sample.lap, 7);
        assert_eq!(sample.lap_best_s, 88.5);
    }

    #[test]
    fn lap_times_fall_back_when_non_positive() {
        let source = MapSource::new()
            .with("PlayerCarIdx", 0)
            .with("LapLastLapTime", -1.0)
            .with("CarIdxLastLapTime", vec![92.25])
            .with("CarIdxBestLapTime", vec![91.5]);
        let sample = derive_sample(&source, 0);
        assert_eq!(sample.lap_last_s, 92.25);
        assert_eq!(sample.lap_best_s, 91.5);
        assert_eq!(sample.lap_current_s, 0.0);
    }

    #[test]
    fn unknown_player_index_skips_fallback() {
        let source = MapSource::new()
            .with("Lap", 0)
            .with("CarIdxLap", vec![12]);
        assert_eq!(derive_sample(&source, 0).lap, 0);

        let source = source.with("PlayerCarIdx", -1);
        assert_eq!(derive_sample(&source, 0).lap, 0);
    }

    #[test]
    fn out_of_range_index_keeps_primary() {
        let source = MapSource::new()
            .with("PlayerCarIdx", 5)
            .with("PlayerCarClassPosition", 0)
            .with("CarIdxClassPosition", vec![1, 2]);
        assert_eq!(derive_sample(&source, 0).class_position, 0);
    }

    #[test]
    fn bounded_inputs_are_clamped() {
        let source = MapSource::new()
            .with("Throttle", 1.2)
            .with("Brake", -0.1)
            .with("FuelLevelPct", 55.0);
        let sample = derive_sample(&source, 3);
        assert_eq!(sample.sequence, 3);
        assert_eq!(sample.throttle, 1.0);
        assert_eq!(sample.brake, 0.0);
        assert!((sample.fuel_pct - 0.55).abs() < 1e-12);
    }

    #[test]
    fn speed_is_converted_to_kmh() {
        let source = MapSource::new().with("Speed", 10.0);
        assert!((derive_sample(&source, 0).speed_kmh - 36.0).abs() < 1e-9);
    }

    #[test]
    fn unready_source_derives_defaults() {
        let mut source = MapSource::new().with("RPM", 4000.0).with("Gear", 2);
        source.set_ready(false);
        let sample = derive_sample(&source, 1);
        assert_eq!(sample, Sample { sequence: 1, ..Sample::default() });
    }
}
