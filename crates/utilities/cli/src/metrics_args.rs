//! Metrics flags.

use crate::{CliResult, init_prometheus_server};
use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default port of the Prometheus exporter.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Prometheus exporter arguments.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct MetricsArgs {
    /// Serve metrics over HTTP.
    #[arg(long = "metrics.enabled", env = "SHARDEX_METRICS_ENABLED")]
    pub enabled: bool,
    /// Address the metrics server listens on.
    #[arg(long = "metrics.addr", env = "SHARDEX_METRICS_ADDR", default_value = "0.0.0.0")]
    pub addr: IpAddr,
    /// Port the metrics server listens on.
    #[arg(
        long = "metrics.port",
        env = "SHARDEX_METRICS_PORT",
        default_value_t = DEFAULT_METRICS_PORT
    )]
    pub port: u16,
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_METRICS_PORT,
        }
    }
}

impl MetricsArgs {
    /// Starts the exporter when enabled and returns the address it serves.
    pub fn init_metrics(&self) -> CliResult<Option<SocketAddr>> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(init_prometheus_server(self.addr, self.port)?))
    }
}
