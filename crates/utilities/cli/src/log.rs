//! Logging flags.

use crate::{CliResult, init_tracing_subscriber};
use clap::{ArgAction, Args, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable, one event per line.
    #[default]
    Full,
    /// Shorter human readable lines.
    Compact,
    /// Newline delimited JSON.
    Json,
}

/// Logging arguments shared by all commands.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level: `-v` for debug, `-vv` for trace. `RUST_LOG` takes precedence.
    #[arg(short = 'v', long = "verbosity", action = ArgAction::Count, global = true)]
    pub verbosity: u8,
    /// Format of log output.
    #[arg(
        long = "log.format",
        value_enum,
        default_value_t = LogFormat::Full,
        env = "SHARDEX_LOG_FORMAT",
        global = true
    )]
    pub format: LogFormat,
}

impl LogArgs {
    /// Maps the verbosity count to the default level.
    pub const fn level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global tracing subscriber.
    pub fn init_tracing(&self) -> CliResult<()> {
        init_tracing_subscriber(self.level(), self.format, None)
    }
}
