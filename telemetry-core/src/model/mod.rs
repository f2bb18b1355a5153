// Core data model for derived telemetry samples.

mod sample;

pub use sample::Sample;
