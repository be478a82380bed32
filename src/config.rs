//! Agent configuration
//!
//! Settings come from three layers, highest priority first:
//!
//! 1. command line flags and their environment variables
//! 2. an optional YAML file (`--config`)
//! 3. built-in defaults
//!
//! ```yaml
//! server_url: http://192.168.1.20:3000
//! driver_name: Alex
//! replay: sessions/summit.yaml
//! poll_interval_ms: 100
//! reconnect_delay_max_ms: 10000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::debug;

use crate::collector::TransportConfig;
use crate::collector::socketio::websocket_url;
use crate::supervisor::PollCadence;
use crate::types::RegisterAgent;
use crate::{RelayError, Result};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_DRIVER_NAME: &str = "Driver";
const UNKNOWN_HOST: &str = "unknown-host";

/// Command line interface
#[derive(Debug, Default, Clone, Parser)]
#[command(name = "lapwire", version, about = "Relays completed laps from the simulator to a lap-time collector")]
pub struct Cli {
    /// Collector URL (http:// or ws://)
    #[arg(long, env = "LAPWIRE_SERVER_URL")]
    pub server_url: Option<String>,

    /// Name shown for this driver on the collector
    #[arg(long, env = "DRIVER_NAME")]
    pub driver_name: Option<String>,

    /// Machine name reported to the collector (defaults to the host name)
    #[arg(long, env = "LAPWIRE_COMPUTER_NAME")]
    pub computer_name: Option<String>,

    /// Replay script used as the telemetry source
    #[arg(long, value_name = "SCRIPT")]
    pub replay: Option<PathBuf>,

    /// Restart the replay script after its last session
    #[arg(long)]
    pub loop_replay: bool,

    /// YAML configuration file
    #[arg(long, short = 'c', env = "LAPWIRE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `lapwire=debug` (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

/// Contents of the optional configuration file
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub driver_name: Option<String>,
    pub computer_name: Option<String>,
    pub replay: Option<PathBuf>,
    pub loop_replay: Option<bool>,

    pub poll_interval_ms: Option<u64>,
    pub probe_interval_ms: Option<u64>,
    pub error_backoff_ms: Option<u64>,

    pub connect_timeout_ms: Option<u64>,
    pub reconnect: Option<bool>,
    pub reconnect_delay_ms: Option<u64>,
    pub reconnect_delay_max_ms: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelayError::file_error(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| RelayError::parse("configuration file", e.to_string()))
    }
}

/// Fully resolved agent settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub server_url: String,
    pub driver_name: String,
    pub computer_name: String,
    pub replay: Option<PathBuf>,
    pub loop_replay: bool,
    pub cadence: PollCadence,
    pub transport: TransportConfig,
}

impl AgentConfig {
    /// Resolve settings from the command line, reading `--config` if given.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                debug!(path = %path.display(), "Reading configuration file");
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        Self::resolve(cli, file, host_name)
    }

    /// Merge the layers. `host` supplies the default computer name.
    pub fn resolve(cli: &Cli, file: FileConfig, host: impl FnOnce() -> String) -> Result<Self> {
        let server_url = pick(cli.server_url.clone(), file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        websocket_url(&server_url)?;

        let driver_name = pick(cli.driver_name.clone(), file.driver_name)
            .unwrap_or_else(|| DEFAULT_DRIVER_NAME.to_string());
        let computer_name = pick(cli.computer_name.clone(), file.computer_name)
            .or_else(|| non_blank(Some(host())))
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());

        let defaults = PollCadence::default();
        let cadence = PollCadence {
            poll_interval: millis(file.poll_interval_ms, "poll_interval_ms")?
                .unwrap_or(defaults.poll_interval),
            probe_interval: millis(file.probe_interval_ms, "probe_interval_ms")?
                .unwrap_or(defaults.probe_interval),
            error_backoff: millis(file.error_backoff_ms, "error_backoff_ms")?
                .unwrap_or(defaults.error_backoff),
        };

        let defaults = TransportConfig::default();
        let transport = TransportConfig {
            connect_timeout: millis(file.connect_timeout_ms, "connect_timeout_ms")?
                .unwrap_or(defaults.connect_timeout),
            reconnect: file.reconnect.unwrap_or(defaults.reconnect),
            reconnect_delay: millis(file.reconnect_delay_ms, "reconnect_delay_ms")?
                .unwrap_or(defaults.reconnect_delay),
            reconnect_delay_max: millis(file.reconnect_delay_max_ms, "reconnect_delay_max_ms")?
                .unwrap_or(defaults.reconnect_delay_max),
        };
        if transport.reconnect_delay > transport.reconnect_delay_max {
            return Err(RelayError::config("reconnect_delay_ms exceeds reconnect_delay_max_ms"));
        }

        Ok(Self {
            server_url,
            driver_name,
            computer_name,
            replay: cli.replay.clone().or(file.replay),
            loop_replay: cli.loop_replay || file.loop_replay.unwrap_or(false),
            cadence,
            transport,
        })
    }

    /// Registration payload for this agent
    pub fn identity(&self) -> RegisterAgent {
        RegisterAgent {
            driver_name: self.driver_name.clone(),
            computer_name: self.computer_name.clone(),
        }
    }
}

/// Host name of this machine, as reported by the OS.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    non_blank(primary).or_else(|| non_blank(fallback))
}

fn millis(value: Option<u64>, key: &str) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(RelayError::config(format!("{key} must be greater than zero"))),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None => Ok(None),
    }
}
