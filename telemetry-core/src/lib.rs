// Shared telemetry reading, derivation and wire encoding.

pub mod derivation;
pub mod irsdk;
pub mod model;
pub mod payload;
pub mod reader;
pub mod source;
pub mod value;
