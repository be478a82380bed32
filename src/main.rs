use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lapwire::collector::{ConnectionManager, SocketIoChannel};
use lapwire::config::{AgentConfig, Cli};
use lapwire::providers::ReplayProvider;
use lapwire::{RelayError, Supervisor};

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AgentConfig::load(&cli).context("failed to load configuration")?;

    let Some(script) = config.replay.as_ref() else {
        bail!("no telemetry source configured; pass --replay <SCRIPT> or set `replay` in the config file");
    };
    let provider = ReplayProvider::open(script)
        .with_context(|| format!("failed to open replay script {}", script.display()))?
        .looping(config.loop_replay);

    info!(
        server = %config.server_url,
        driver = %config.driver_name,
        computer = %config.computer_name,
        "Starting lap relay"
    );

    let (channel, events) = SocketIoChannel::new(config.transport.clone());
    let connection = ConnectionManager::spawn(channel, events, config.identity());
    let supervisor = Supervisor::new(provider, connection, config.server_url.clone(), config.cadence);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                interrupt.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for interrupt"),
        }
    });

    match supervisor.run(cancel).await {
        Ok(stats) => {
            info!(
                frames = stats.frames_read,
                laps_detected = stats.laps_detected,
                laps_sent = stats.laps_sent,
                laps_dropped = stats.laps_dropped,
                loop_errors = stats.loop_errors,
                "Lap relay stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ RelayError::Connection { .. }) => {
            error!(error = %e, "Collector unreachable at startup");
            for suggestion in e.recovery_suggestions() {
                info!("  - {suggestion}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("lap relay failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_deref()) {
        eprintln!("lapwire: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
