//! Subscriber setup for hosts embedding the bridge.
//!
//! The bridge only emits `tracing` events under the `satell::*` targets.
//! Installing a subscriber is the host's call; tests never need one.
//! A non-empty `RUST_LOG` replaces the configured levels.

use std::io;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::config::{LogConfig, LogFormat};

/// Every target the bridge logs under.
pub const TARGETS: [&str; 5] = [
    "satell::stack",
    "satell::call",
    "satell::gc",
    "satell::foreign",
    "satell::loader",
];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level '{level}' for '{target}'")]
    Level { target: String, level: String },
    #[error("unknown log target '{0}'")]
    Target(String),
    #[error("invalid filter directives '{directives}': {reason}")]
    Directives { directives: String, reason: String },
    #[error("global subscriber already installed: {0}")]
    AlreadySet(#[from] tracing_subscriber::util::TryInitError),
}

fn parse_level(target: &str, level: &str) -> Result<LevelFilter, LoggingError> {
    LevelFilter::from_str(level).map_err(|_| LoggingError::Level {
        target: target.to_string(),
        level: level.to_string(),
    })
}

/// Build the target filter described by `config`. Only the bridge's own
/// targets can be tuned individually.
pub fn targets(config: &LogConfig) -> Result<Targets, LoggingError> {
    let mut filter = Targets::new().with_default(parse_level("*", &config.level)?);
    for (target, level) in &config.targets {
        if !TARGETS.contains(&target.as_str()) {
            return Err(LoggingError::Target(target.clone()));
        }
        filter = filter.with_target(target.clone(), parse_level(target, level)?);
    }
    Ok(filter)
}

/// `RUST_LOG`-style directives, e.g. `satell::gc=trace,warn`.
pub fn env_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|e| LoggingError::Directives {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

fn env_directives() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|d| !d.trim().is_empty())
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .without_time()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}

/// Install the global subscriber. Fails instead of panicking when one is
/// already set.
pub fn try_init(config: &LogConfig) -> Result<(), LoggingError> {
    let layer = match env_directives() {
        Some(directives) => format_layer(config.format)
            .with_filter(env_filter(&directives)?)
            .boxed(),
        None => format_layer(config.format)
            .with_filter(targets(config)?)
            .boxed(),
    };
    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}
