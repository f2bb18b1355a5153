// Crate root for the iRacing telemetry UDP bridge.

pub mod app;
pub mod cli;
pub mod constants;
pub mod demo;
pub mod net;
pub mod recording;
pub mod shm;
pub mod tasks;
pub mod telemetry;
pub mod udp;
pub mod utils;
