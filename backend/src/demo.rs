// Replay source serving recorded telemetry frames, one per tick.
// Invariants: frames are loaded once at startup; playback loops at end of file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use telemetry_core::source::{SourceError, TelemetrySource};
use telemetry_core::value::Value;

type Frame = HashMap<String, Value>;

pub struct ReplaySource {
    frames: Vec<Frame>,
    next: usize,
    current: Option<usize>,
    started: bool,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let source = Self::from_reader(BufReader::new(file))?;
        info!(path = %path.display(), frames = source.len(), "replay loaded");
        Ok(source)
    }

    /// Parses JSON lines, one object of field name to value per line. Blank
    /// lines are skipped. A `null` field is dropped and reads as absent.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, SourceError> {
        let mut frames = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: HashMap<String, Option<Value>> =
                serde_json::from_str(&line).map_err(|err| SourceError::Malformed {
                    line: index + 1,
                    reason: err.to_string(),
                })?;
            let frame: Frame = raw
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
                .collect();
            frames.push(frame);
        }
        Ok(Self {
            frames,
            next: 0,
            current: None,
            started: false,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl TelemetrySource for ReplaySource {
    fn startup(&mut self) -> Result<(), SourceError> {
        if self.frames.is_empty() {
            return Err(SourceError::NotRunning);
        }
        self.started = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SourceError> {
        self.started = false;
        self.current = None;
        Ok(())
    }

    fn poll(&mut self) {
        if !self.started || self.frames.is_empty() {
            return;
        }
        self.current = Some(self.next);
        self.next = (self.next + 1) % self.frames.len();
    }

    fn is_ready(&self) -> bool {
        self.started && self.current.is_some()
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.current
            .and_then(|index| self.frames.get(index))
            .and_then(|frame| frame.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::derivation::derive_sample;

    const CAPTURE: &str = r#"{"RPM": 3000.0, "Gear": 1, "CarIdxLap": [0, 4]}

{"RPM": 3500.5, "Gear": 2, "PlayerCarIdx": 1, "Lap": 0, "CarIdxLap": [0, 5]}
"#;

    #[test]
    fn serves_frames_in_order_and_loops() {
        let mut source = ReplaySource::from_reader(CAPTURE.as_bytes()).unwrap();
        assert_eq!(source.len(), 2);
        assert!(!source.is_ready());

        source.startup().unwrap();
        let mut gears = Vec::new();
        for _ in 0..3 {
            source.poll();
            gears.push(source.get("Gear").cloned());
        }
        assert_eq!(
            gears,
            vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(1))]
        );
    }

    #[test]
    fn replayed_frame_feeds_derivation() {
        let mut source = ReplaySource::from_reader(CAPTURE.as_bytes()).unwrap();
        source.startup().unwrap();
        source.poll();
        source.poll();
        let sample = derive_sample(&source, 0);
        assert_eq!(sample.rpm, 3500.5);
        assert_eq!(sample.lap, 5);
    }

    #[test]
    fn null_fields_read_as_absent() {
        let capture = "{\"RPM\": 3000.0, \"Gear\": null, \"PlayerCarPosition\": null}\n";
        let mut source = ReplaySource::from_reader(capture.as_bytes()).unwrap();
        source.startup().unwrap();
        source.poll();

        assert_eq!(source.get("Gear"), None);
        let sample = derive_sample(&source, 0);
        assert_eq!(sample.rpm, 3000.0);
        assert_eq!(sample.gear, 0);
        assert_eq!(sample.position, 0);
    }

    #[test]
    fn shutdown_clears_readiness() {
        let mut source = ReplaySource::from_reader(CAPTURE.as_bytes()).unwrap();
        source.startup().unwrap();
        source.poll();
        assert!(source.is_ready());
        source.shutdown().unwrap();
        assert!(!source.is_ready());
        assert_eq!(source.get("RPM"), None);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = ReplaySource::from_reader("{\"RPM\": 1}\nnot json\n".as_bytes())
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Malformed { line: 2, .. }));
    }

    #[test]
    fn empty_capture_never_starts() {
        let mut source = ReplaySource::from_reader("".as_bytes()).unwrap();
        assert!(source.is_empty());
        assert!(matches!(source.startup(), Err(SourceError::NotRunning)));
    }
}
