// Main sampling loop: provider readiness, derivation, dispatch, sinks and pacing.
// Invariants: one task owns the socket and log file; shutdown is only observed between ticks.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;

use chrono::Local;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::app::Config;
use crate::net::{Destination, HostLookup, SystemLookup};
use crate::recording::CsvSink;
use crate::telemetry::StatusReporter;
use crate::udp::{DispatchReport, Dispatcher};
use crate::utils::{now_unix_secs, RateLimit};
use telemetry_core::derivation::derive_sample;
use telemetry_core::source::TelemetrySource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Waiting,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Waiting,
    Dispatched(DispatchReport),
}

pub struct Bridge<S, L = SystemLookup> {
    config: Config,
    source: S,
    lookup: L,
    destinations: Vec<Destination>,
    dispatcher: Dispatcher,
    csv: Option<CsvSink>,
    status: StatusReporter,
    waiting_log: RateLimit,
    state: LoopState,
    sequence: u64,
}

impl<S: TelemetrySource, L: HostLookup> Bridge<S, L> {
    pub async fn new(config: Config, source: S, lookup: L) -> std::io::Result<Self> {
        let dispatcher = Dispatcher::bind(config.bind_addr).await?;

        let csv = match config.log_dir.as_deref() {
            Some(dir) => {
                let sink = CsvSink::create(dir, Local::now())?;
                info!(path = %sink.path().display(), "logging to csv");
                Some(sink)
            }
            None => {
                info!("live mode: csv logging disabled");
                None
            }
        };

        let destinations: Vec<Destination> = config
            .destinations
            .iter()
            .cloned()
            .map(Destination::new)
            .collect();
        let targets = config
            .destinations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        info!(destinations = %targets, send_hz = config.send_hz, "sending udp telemetry");

        Ok(Self {
            status: StatusReporter::new(config.status_interval),
            waiting_log: RateLimit::new(config.status_interval),
            config,
            source,
            lookup,
            destinations,
            dispatcher,
            csv,
            state: LoopState::Waiting,
            sequence: 0,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv.as_ref().map(CsvSink::path)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.dispatcher.local_addr()
    }

    /// Runs one iteration: readiness check, derivation, dispatch, sinks and
    /// the sequence increment. Pacing is left to the caller.
    pub async fn tick(&mut self) -> TickOutcome {
        self.source.poll();
        let now = Instant::now();

        if !self.source.is_ready() {
            if self.state == LoopState::Running {
                info!(seq = self.sequence, "telemetry source lost");
            }
            self.state = LoopState::Waiting;
            if self.waiting_log.ready(now) {
                info!("waiting for simulator telemetry (not initialized)");
            }
            return TickOutcome::Waiting;
        }

        if self.state == LoopState::Waiting {
            info!(seq = self.sequence, "telemetry source ready");
            self.state = LoopState::Running;
        }

        let sample = derive_sample(&self.source, self.sequence);
        let report = self
            .dispatcher
            .send(
                &sample,
                &mut self.destinations,
                &self.lookup,
                self.config.resolve_interval,
            )
            .await;

        if let Some(csv) = self.csv.as_mut() {
            if let Err(err) = csv.write(&sample, now_unix_secs()) {
                warn!(?err, "csv write failed");
            }
        }
        self.status.maybe_report(&sample, &report, now);

        self.sequence += 1;
        TickOutcome::Dispatched(report)
    }

    /// Ticks at the configured rate until `shutdown` resolves, then tears down.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.start_source();
        let period = self.config.period();

        loop {
            let started = Instant::now();
            let outcome = self.tick().await;
            let deadline = match outcome {
                TickOutcome::Waiting => started + self.config.waiting_backoff,
                TickOutcome::Dispatched(_) => started + period,
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(seq = self.sequence, "stopped by user");
                    break;
                }
                _ = time::sleep_until(deadline) => {}
            }

            if outcome == TickOutcome::Waiting {
                self.start_source();
            }
        }

        self.teardown();
    }

    /// Releases the source, log file and socket. Each step runs even if an
    /// earlier one failed.
    pub fn teardown(self) {
        let Self {
            mut source,
            dispatcher,
            csv,
            sequence,
            ..
        } = self;

        if let Err(err) = source.shutdown() {
            warn!(%err, "telemetry source shutdown failed");
        }

        if let Some(csv) = csv {
            let path = csv.path().to_path_buf();
            let rows = csv.rows();
            match csv.finish() {
                Ok(()) => info!(path = %path.display(), rows, "csv log closed"),
                Err(err) => warn!(?err, path = %path.display(), "csv flush failed"),
            }
        }

        drop(dispatcher);
        info!(ticks = sequence, "bridge stopped");
    }

    fn start_source(&mut self) {
        if let Err(err) = self.source.startup() {
            debug!(%err, "telemetry source not started");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::DestinationSpec;
    use std::cell::Cell;
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;
    use std::time::Duration;

    use crate::recording::tests::BreakableWriter;
    use telemetry_core::source::{MapSource, SourceError};
    use telemetry_core::value::Value;
    use tokio::net::UdpSocket;

    struct CountingSource {
        inner: MapSource,
        startups: Rc<Cell<u32>>,
        shutdowns: Rc<Cell<u32>>,
    }

    impl CountingSource {
        fn new(inner: MapSource) -> Self {
            Self {
                inner,
                startups: Rc::default(),
                shutdowns: Rc::default(),
            }
        }
    }

    impl TelemetrySource for CountingSource {
        fn startup(&mut self) -> Result<(), SourceError> {
            self.startups.set(self.startups.get() + 1);
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), SourceError> {
            self.shutdowns.set(self.shutdowns.get() + 1);
            Err(SourceError::NotRunning)
        }

        fn is_ready(&self) -> bool {
            self.inner.is_ready()
        }

        fn get(&self, key: &str) -> Option<&Value> {
            self.inner.get(key)
        }
    }

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn test_config(port: u16) -> Config {
        Config {
            destinations: vec![DestinationSpec::new("127.0.0.1", port)],
            send_hz: 50.0,
            waiting_backoff: Duration::from_millis(20),
            log_dir: None,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Config::default()
        }
    }

    async fn recv_line(socket: &UdpSocket) -> Option<String> {
        let mut buf = [0u8; 512];
        let (len, _) = time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Some(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    fn sequence_of(line: &str) -> u64 {
        line.split(',').next().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn sequence_increments_once_per_running_tick() {
        let (socket, port) = receiver().await;
        let source = MapSource::new().with("RPM", 5000.0).with("Gear", 2);
        let mut bridge = Bridge::new(test_config(port), source, SystemLookup)
            .await
            .unwrap();

        for expected in 0..25u64 {
            let outcome = bridge.tick().await;
            assert!(matches!(outcome, TickOutcome::Dispatched(report) if report.sent == 1));
            let line = recv_line(&socket).await.expect("datagram");
            assert_eq!(sequence_of(&line), expected);
        }
        assert_eq!(bridge.sequence(), 25);
        assert_eq!(bridge.state(), LoopState::Running);
    }

    #[tokio::test]
    async fn waits_until_source_is_ready() {
        let (socket, port) = receiver().await;
        let mut source = MapSource::new().with("RPM", 5000.0);
        source.set_ready(false);
        let mut bridge = Bridge::new(test_config(port), source, SystemLookup)
            .await
            .unwrap();

        assert_eq!(bridge.tick().await, TickOutcome::Waiting);
        assert_eq!(bridge.tick().await, TickOutcome::Waiting);
        assert_eq!(bridge.sequence(), 0);
        assert_eq!(bridge.state(), LoopState::Waiting);

        bridge.source_mut().set_ready(true);
        assert!(matches!(bridge.tick().await, TickOutcome::Dispatched(_)));
        assert_eq!(bridge.state(), LoopState::Running);
        let line = recv_line(&socket).await.expect("datagram");
        assert!(line.starts_with("0,5000.0,"), "{line}");

        bridge.source_mut().set_ready(false);
        assert_eq!(bridge.tick().await, TickOutcome::Waiting);
        assert_eq!(bridge.state(), LoopState::Waiting);
        assert_eq!(bridge.sequence(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_tears_down() {
        let (socket, port) = receiver().await;
        let source = CountingSource::new(MapSource::new().with("Speed", 10.0));
        let startups = source.startups.clone();
        let shutdowns = source.shutdowns.clone();
        let bridge = Bridge::new(test_config(port), source, SystemLookup)
            .await
            .unwrap();

        bridge.run(time::sleep(Duration::from_millis(150))).await;

        assert_eq!(startups.get(), 1);
        assert_eq!(shutdowns.get(), 1);
        let mut expected = 0;
        while let Some(line) = recv_line(&socket).await {
            assert_eq!(sequence_of(&line), expected);
            expected += 1;
        }
        assert!(expected >= 2, "only {expected} datagrams");
    }

    #[tokio::test]
    async fn waiting_state_retries_startup() {
        let (socket, port) = receiver().await;
        let mut inner = MapSource::new();
        inner.set_ready(false);
        let source = CountingSource::new(inner);
        let startups = source.startups.clone();
        let bridge = Bridge::new(test_config(port), source, SystemLookup)
            .await
            .unwrap();

        bridge.run(time::sleep(Duration::from_millis(110))).await;

        assert!(startups.get() >= 3, "startups {}", startups.get());
        assert!(recv_line(&socket).await.is_none());
    }

    #[tokio::test]
    async fn csv_rows_mirror_ticks() {
        let (_socket, port) = receiver().await;
        let dir = std::env::temp_dir().join(format!("irsdk-bridge-run-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = Config {
            log_dir: Some(dir.clone()),
            ..test_config(port)
        };
        let mut bridge = Bridge::new(config, MapSource::new().with("Gear", 4), SystemLookup)
            .await
            .unwrap();
        let path = bridge.csv_path().unwrap().to_path_buf();

        for _ in 0..3 {
            bridge.tick().await;
        }
        bridge.teardown();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let seqs: Vec<String> = reader
            .records()
            .map(|record| record.unwrap()[1].to_string())
            .collect();
        assert_eq!(seqs, vec!["0", "1", "2"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn csv_failure_does_not_stop_ticks_or_teardown() {
        let (socket, port) = receiver().await;
        let source = CountingSource::new(MapSource::new().with("Gear", 3));
        let shutdowns = source.shutdowns.clone();
        let mut bridge = Bridge::new(test_config(port), source, SystemLookup)
            .await
            .unwrap();
        let writer = BreakableWriter::default();
        let broken = writer.broken.clone();
        bridge.csv = Some(CsvSink::from_writer("broken.csv".into(), Box::new(writer)).unwrap());
        broken.set(true);

        for expected in 0..3u64 {
            assert!(matches!(bridge.tick().await, TickOutcome::Dispatched(report) if report.sent == 1));
            let line = recv_line(&socket).await.expect("datagram");
            assert_eq!(sequence_of(&line), expected);
        }
        assert_eq!(bridge.sequence(), 3);

        let local = bridge.local_addr().unwrap();
        bridge.teardown();
        assert_eq!(shutdowns.get(), 1);
        UdpSocket::bind(local).await.expect("socket released");
    }
}
