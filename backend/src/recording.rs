// Per-run CSV log of derived samples.
// Invariants: header is written when the file is created; rows mirror exactly what was dispatched.
// Each row is flushed as it is written, so write errors surface on the tick that caused them.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::utils::log_file_name;
use telemetry_core::model::Sample;

pub const CSV_HEADER: [&str; 19] = [
    "ts_unix",
    "seq",
    "rpm",
    "gear",
    "throttle",
    "brake",
    "steer_norm",
    "session_remain_s",
    "fuel_l",
    "fuel_pct",
    "speed_kmh",
    "incidents",
    "lap",
    "pos",
    "class_pos",
    "lap_cur",
    "lap_last",
    "lap_best",
    "is_replay",
];

#[derive(Serialize)]
struct CsvRow {
    ts_unix: f64,
    seq: u64,
    rpm: f64,
    gear: i32,
    throttle: f64,
    brake: f64,
    steer_norm: f64,
    session_remain_s: f64,
    fuel_l: f64,
    fuel_pct: f64,
    speed_kmh: f64,
    incidents: i32,
    lap: i32,
    pos: i32,
    class_pos: i32,
    lap_cur: f64,
    lap_last: f64,
    lap_best: f64,
    is_replay: u8,
}

impl CsvRow {
    fn new(sample: &Sample, ts_unix: f64) -> Self {
        Self {
            ts_unix,
            seq: sample.sequence,
            rpm: sample.rpm,
            gear: sample.gear,
            throttle: sample.throttle,
            brake: sample.brake,
            steer_norm: sample.steer_ratio,
            session_remain_s: sample.session_remain_s,
            fuel_l: sample.fuel_l,
            fuel_pct: sample.fuel_pct,
            speed_kmh: sample.speed_kmh,
            incidents: sample.incidents,
            lap: sample.lap,
            pos: sample.position,
            class_pos: sample.class_position,
            lap_cur: sample.lap_current_s,
            lap_last: sample.lap_last_s,
            lap_best: sample.lap_best_s,
            is_replay: u8::from(sample.is_replay),
        }
    }
}

pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<Box<dyn Write>>,
    rows: u64,
}

impl CsvSink {
    pub fn create(dir: &Path, started: DateTime<Local>) -> csv::Result<Self> {
        let path = dir.join(log_file_name(started));
        Self::create_at(path)
    }

    pub fn create_at(path: PathBuf) -> csv::Result<Self> {
        let file = File::create(&path)?;
        Self::from_writer(path, Box::new(file))
    }

    /// Wraps an already open writer; `path` is only reported in logs.
    pub fn from_writer(path: PathBuf, inner: Box<dyn Write>) -> csv::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write(&mut self, sample: &Sample, ts_unix: f64) -> csv::Result<()> {
        self.writer.serialize(CsvRow::new(sample, ts_unix))?;
        self.writer.flush()?;
        self.rows = self.rows.saturating_add(1);
        Ok(())
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
