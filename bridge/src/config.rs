//! Runtime configuration, loadable from TOML.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Default maximum value-stack slots.
pub const STACK_LIMIT: usize = 1_000_000;
/// Slots reserved on start-up and on native frame entry.
pub const INITIAL_STACK: usize = 20;
/// Nested native frames allowed before `ResourceExhausted`.
pub const MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What happens to a Rust panic caught at the native call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Convert into a `NativeRaised` error at the nearest protected call.
    #[default]
    CatchAndRaise,
    /// Record an error diagnostic and return zero results.
    LogAndSwallow,
    /// Resume unwinding past the boundary. Debugging aid only.
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level for every target not listed in `targets`.
    pub level: String,
    pub format: LogFormat,
    /// Per-target overrides, e.g. `"satell::gc" = "debug"`.
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            targets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub stack_limit: usize,
    pub initial_stack: usize,
    pub heap_limit: Option<usize>,
    pub gc_threshold: usize,
    pub max_call_depth: usize,
    pub panic_policy: PanicPolicy,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_limit: STACK_LIMIT,
            initial_stack: INITIAL_STACK,
            heap_limit: None,
            gc_threshold: memory::heap::MIN_GC_THRESHOLD,
            max_call_depth: MAX_CALL_DEPTH,
            panic_policy: PanicPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }
}
