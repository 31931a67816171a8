//! Installation of the global [`tracing`] subscriber.

use crate::{CliError, CliResult, LogFormat};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber as the global default.
///
/// Without an explicit `filter`, directives are read from `RUST_LOG` and everything else is
/// logged at `level`.
pub fn init_tracing_subscriber(
    level: LevelFilter,
    format: LogFormat,
    filter: Option<EnvFilter>,
) -> CliResult<()> {
    let filter = filter.unwrap_or_else(|| {
        EnvFilter::builder().with_default_directive(level.into()).from_env_lossy()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|err| CliError::TracingInitialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let filter = || Some(EnvFilter::new("off"));
        // another test may have installed a subscriber already
        let _ = init_tracing_subscriber(LevelFilter::INFO, LogFormat::Compact, filter());

        let err =
            init_tracing_subscriber(LevelFilter::INFO, LogFormat::Json, filter()).unwrap_err();
        assert!(matches!(err, CliError::TracingInitialization(_)));
    }
}
