// Live simulator source backed by the iRacing shared-memory mapping.
// Invariants: each poll copies and decodes one snapshot; lookups never touch the live mapping.

#[cfg(not(windows))]
mod unsupported;
#[cfg(windows)]
mod win;

#[cfg(not(windows))]
use self::unsupported as platform;
#[cfg(windows)]
use self::win as platform;

use tracing::{debug, info};

use crate::constants::IRSDK_MEM_MAP_NAME;
use telemetry_core::irsdk::Snapshot;
use telemetry_core::source::{SourceError, TelemetrySource};
use telemetry_core::value::Value;

#[derive(Default)]
pub struct SharedMemorySource {
    mapping: Option<platform::Mapping>,
    buffer: Vec<u8>,
    snapshot: Option<Snapshot>,
}

impl SharedMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_count(&self) -> Option<i32> {
        self.snapshot.as_ref().map(|snapshot| snapshot.tick_count)
    }
}

impl TelemetrySource for SharedMemorySource {
    fn startup(&mut self) -> Result<(), SourceError> {
        if self.mapping.is_some() {
            return Ok(());
        }
        let mapping = platform::Mapping::open(IRSDK_MEM_MAP_NAME)?;
        info!(name = IRSDK_MEM_MAP_NAME, "simulator memory mapped");
        self.mapping = Some(mapping);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SourceError> {
        if self.mapping.take().is_some() {
            debug!("simulator memory unmapped");
        }
        self.snapshot = None;
        Ok(())
    }

    fn poll(&mut self) {
        self.snapshot = match self.mapping.as_ref() {
            Some(mapping) if mapping.copy_into(&mut self.buffer) => Snapshot::decode(&self.buffer),
            _ => None,
        };
    }

    fn is_ready(&self) -> bool {
        self.snapshot
            .as_ref()
            .map(Snapshot::is_connected)
            .unwrap_or(false)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.as_ref().and_then(|snapshot| snapshot.values.get(key))
    }
}
