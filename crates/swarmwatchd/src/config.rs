//! Command-line configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};

use swarmwatch_cluster::{DEFAULT_DOCKER_HOST, DockerEndpoint};
use swarmwatch_reconcile::DEFAULT_MAX_CONCURRENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// `EnvFilter` directive for this level. `fatal` and `panic` have no
    /// tracing equivalent and collapse to `error`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "swarmwatchd",
    about = "Prometheus exporter for Docker Swarm service replicas",
    version
)]
pub struct Config {
    /// Address the metrics server listens on.
    #[arg(long, env = "SWARMWATCH_LISTEN_ADDR", default_value = "0.0.0.0:8888")]
    pub listen_addr: SocketAddr,

    /// Delay between two task snapshots, e.g. "500ms", "10s", "1m".
    #[arg(
        long,
        env = "SWARMWATCH_POLL_DELAY",
        default_value = "10s",
        value_parser = parse_duration
    )]
    pub poll_delay: Duration,

    #[arg(long, env = "SWARMWATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// RUST_LOG takes precedence when set.
    #[arg(long, env = "SWARMWATCH_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Service label to mirror onto every series. Repeatable.
    #[arg(long = "label", value_name = "NAME")]
    pub labels: Vec<String>,

    /// Docker Engine endpoint (unix:///path or tcp://host:port).
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub docker_host: String,

    /// Upper bound on cluster events processed at the same time.
    #[arg(long, env = "SWARMWATCH_MAX_CONCURRENT_EVENTS", default_value_t = DEFAULT_MAX_CONCURRENT)]
    pub max_concurrent_events: usize,
}

impl Config {
    /// Reject settings no subsystem could start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_delay.is_zero() {
            bail!("--poll-delay must be greater than zero");
        }
        if self.max_concurrent_events == 0 {
            bail!("--max-concurrent-events must be at least 1");
        }
        swarmwatch_metrics::validate_custom_labels(&self.labels).context("invalid --label")?;
        DockerEndpoint::parse(&self.docker_host).context("invalid --docker-host")?;
        Ok(())
    }
}

/// Parse a duration string like "500ms", "10s" or "1m". A bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| format!("invalid duration {s:?}, expected e.g. 500ms, 10s or 1m"))
}
