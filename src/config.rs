//! Runtime configuration.
//!
//! ## Environment Variables
//!
//! - `DISPOSE_RS_LOG`: log filter directive, in `tracing_subscriber::EnvFilter` syntax.
//!   Falls back to `RUST_LOG`, then to `warn`.
//! - `DISPOSE_RS_BUFFER_SIZE`: bytes of native memory each `DerivedResource`
//!   allocates (default: 64).
//! - `DISPOSE_RS_TRACE_EVENTS`: `"1"` or `"true"` to log every lifecycle event at
//!   `info` level instead of `debug`.
//!
//! Command-line flags override whatever the environment says.
use crate::{error::ConfigError, utils::env_flag};
use std::env;

pub const LOG_VAR: &str = "DISPOSE_RS_LOG";
pub const BUFFER_SIZE_VAR: &str = "DISPOSE_RS_BUFFER_SIZE";
pub const TRACE_EVENTS_VAR: &str = "DISPOSE_RS_TRACE_EVENTS";

pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_BUFFER_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub buffer_size: usize,
    pub trace_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            trace_events: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source. `from_env` is this with
    /// `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        if let Some(filter) = non_empty(LOG_VAR).or_else(|| non_empty("RUST_LOG")) {
            config.log_filter = filter;
        }

        if let Some(value) = lookup(BUFFER_SIZE_VAR) {
            config.buffer_size = parse_buffer_size(BUFFER_SIZE_VAR, &value)?;
        }

        if let Some(value) = lookup(TRACE_EVENTS_VAR) {
            config.trace_events = env_flag(&value);
        }

        Ok(config)
    }
}

/// Value parser for the `--buffer-size` flag. Applies the same rules as
/// `DISPOSE_RS_BUFFER_SIZE`.
pub fn parse_buffer_size_arg(value: &str) -> Result<usize, ConfigError> {
    parse_buffer_size(BUFFER_SIZE_VAR, value)
}

fn parse_buffer_size(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason,
    };
    match value.trim().parse::<usize>() {
        Ok(0) => Err(invalid("must be greater than zero".to_string())),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(e.to_string())),
    }
}
