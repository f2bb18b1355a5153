// UDP wire payload encoding.
// Invariants: field count and order are a contract with the receivers; changing either bumps PAYLOAD_VERSION.

use crate::model::Sample;

/// Layout 2: session-remaining and incident count in slots 6 and 8.
/// Layout 1 carried steering ratio and fuel fraction there and is no longer emitted.
pub const PAYLOAD_VERSION: u32 = 2;

pub const PAYLOAD_FIELDS: [&str; 15] = [
    "seq",
    "rpm",
    "gear",
    "throttle",
    "brake",
    "session_remain_s",
    "fuel_l",
    "incidents",
    "speed_kmh",
    "lap",
    "pos",
    "class_pos",
    "lap_cur",
    "lap_last",
    "lap_best",
];

pub fn format_payload(sample: &Sample) -> String {
    format!(
        "{},{:.1},{},{:.3},{:.3},{:.2},{:.3},{},{:.2},{},{},{},{:.3},{:.3},{:.3}",
        sample.sequence,
        sample.rpm,
        sample.gear,
        sample.throttle,
        sample.brake,
        sample.session_remain_s,
        sample.fuel_l,
        sample.incidents,
        sample.speed_kmh,
        sample.lap,
        sample.position,
        sample.class_position,
        sample.lap_current_s,
        sample.lap_last_s,
        sample.lap_best_s,
    )
}

/// ASCII bytes of the payload line; anything outside ASCII is dropped.
pub fn encode_payload(sample: &Sample) -> Vec<u8> {
    format_payload(sample)
        .bytes()
        .filter(u8::is_ascii)
        .collect()
}
