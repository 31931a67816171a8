//! Utilities shared by shardex binaries.
//!
//! Logging flags with [`tracing`] subscriber setup, metrics flags with the Prometheus exporter,
//! and terminal styles for `clap`.

pub mod backtrace;

mod error;
pub use error::{CliError, CliResult, PrometheusError};

pub mod log;
pub use log::{LogArgs, LogFormat};

pub mod metrics_args;
pub use metrics_args::MetricsArgs;

mod prometheus;
pub use prometheus::init_prometheus_server;

mod styles;
pub use styles::cli_styles;

mod subscriber;
pub use subscriber::init_tracing_subscriber;
