// Telemetry source capability and an in-memory implementation.
// Invariants: sources expose values by name only; typing and defaults are the reader's job.

use std::collections::HashMap;

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("simulator is not running")]
    NotRunning,
    #[error("telemetry source io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed telemetry frame at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// A live simulator feed with a startup/shutdown lifecycle and a readiness flag.
///
/// `poll` is called once per tick before any lookup so implementations can
/// refresh their snapshot; `get` must never block.
pub trait TelemetrySource {
    fn startup(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn poll(&mut self) {}

    fn is_ready(&self) -> bool;

    fn get(&self, key: &str) -> Option<&Value>;
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for Box<S> {
    fn startup(&mut self) -> Result<(), SourceError> {
        (**self).startup()
    }

    fn shutdown(&mut self) -> Result<(), SourceError> {
        (**self).shutdown()
    }

    fn poll(&mut self) {
        (**self).poll()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn get(&self, key: &str) -> Option<&Value> {
        (**self).get(key)
    }
}

/// Fixed key/value mapping standing in for the live provider.
#[derive(Clone, Debug)]
pub struct MapSource {
    values: HashMap<String, Value>,
    ready: bool,
}

impl MapSource {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            ready: true,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

impl Default for MapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for MapSource {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}
