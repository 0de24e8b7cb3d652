//! # dispose-rs
//!
//! Deterministic disposal versus collector-driven cleanup, modeled as a small state
//! machine.
//!
//! A disposable type is a chain of tiers (see [`object`]). Its owner may call
//! [`Disposable::dispose`], which runs the chain with `releasing_managed = true`, or
//! drop every [`Rooted`] handle and let a later [`Session::collect`] run the chain
//! with `releasing_managed = false`. Either way the chain runs at most once.
//!
//! ## Feature Flags
//!
//! - `multithreading`: Backs the crate's locks with `parking_lot` instead of the
//!   `std::sync` shim. The disposed flag is atomic in both configurations.
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod demo;
pub mod error;
pub mod gc;
pub mod native;
pub mod object;
pub mod registry;
pub mod session;
pub mod tracer;
pub mod utils;

pub use config::Config;
pub use error::{ConfigError, DisposeError, NativeError, ResourceError};
pub use gc::{CollectReport, FinalizationQueue, Rooted};
pub use object::{
    CleanupHook, CompositeResource, DerivedResource, Disposable, DisposableBase, ObjectId,
};
pub use registry::{LiveSnapshot, TrackedEntry, TrackingRegistry};
pub use session::Session;
pub use tracer::{EventLog, EventSink, LifecycleEvent, Phase};

use demo::Scenario;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Walks through explicit disposal versus collector-driven cleanup"
)]
pub struct Args {
    #[arg(value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,
    /// Instances created per scenario.
    #[arg(short, long, default_value_t = 3)]
    pub count: usize,
    /// Native bytes allocated by each resource.
    #[arg(
        long,
        value_name = "BYTES",
        env = config::BUFFER_SIZE_VAR,
        value_parser = config::parse_buffer_size_arg
    )]
    pub buffer_size: Option<usize>,
    /// Log every lifecycle event at info level.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(n) = self.buffer_size {
            config.buffer_size = n;
        }
        if self.verbose {
            config.trace_events = true;
            if config.log_filter == config::DEFAULT_LOG_FILTER {
                config.log_filter = "info".to_string();
            }
        }
    }
}

pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter {:?}: {}", config.log_filter, e);
        EnvFilter::new(config::DEFAULT_LOG_FILTER)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::from(2);
        }
    };
    args.apply(&mut config);
    init_logging(&config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match demo::run(args.scenario, &config, args.count, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error writing output: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("dispose-rs").chain(args.iter().copied()))
    }

    #[test]
    fn test_buffer_size_flag_overrides_config() {
        let args = parse(&["explicit", "--buffer-size", "16", "-v"]).unwrap();
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(args.scenario, Scenario::Explicit);
        assert_eq!(config.buffer_size, 16);
        assert!(config.trace_events);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_buffer_size_flag_rejects_zero() {
        for bad in ["0", "many"] {
            let err = parse(&["--buffer-size", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }
}
