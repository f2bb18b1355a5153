// Fixed-rate iRacing telemetry to UDP bridge.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use irsdk_udp_bridge::cli::Cli;
use irsdk_udp_bridge::demo::ReplaySource;
use irsdk_udp_bridge::net::SystemLookup;
use irsdk_udp_bridge::shm::SharedMemorySource;
use irsdk_udp_bridge::tasks::Bridge;
use telemetry_core::payload::PAYLOAD_VERSION;
use telemetry_core::source::TelemetrySource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.to_config() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let source: Box<dyn TelemetrySource> = match cli.replay.as_deref() {
        Some(path) => match ReplaySource::open(path) {
            Ok(source) => Box::new(source),
            Err(err) => {
                error!(%err, path = %path.display(), "failed to load replay");
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(SharedMemorySource::new()),
    };

    let bridge = match Bridge::new(config, source, SystemLookup).await {
        Ok(bridge) => bridge,
        Err(err) => {
            error!(?err, "failed to start bridge");
            return ExitCode::FAILURE;
        }
    };

    info!(payload_version = PAYLOAD_VERSION, "start the simulator and get in-car to see live values");
    bridge.run(shutdown_signal()).await;
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
