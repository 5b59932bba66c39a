//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

/// Default RPC port, the one the external tool dials.
pub const DEFAULT_PORT: u16 = 50846;

/// Command-line arguments for the `viewsync` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "viewsync")]
#[command(about = "View synchronization server between a lineage-tracking tool and a 3D viewer")]
#[command(version)]
pub struct CliArgs {
    /// Port to listen on
    #[arg(long, env = "VIEWSYNC_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind (loopback unless you know what you are doing)
    #[arg(long, env = "VIEWSYNC_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// Host thread tick interval in milliseconds
    #[arg(long, env = "VIEWSYNC_TICK_MS", default_value_t = 20)]
    pub tick_ms: u64,

    /// Seconds in-flight calls get to finish after shutdown starts
    #[arg(long, env = "VIEWSYNC_SHUTDOWN_GRACE_SECS", default_value_t = 2)]
    pub shutdown_grace_secs: u64,
}

impl CliArgs {
    /// Address the server binds to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Host thread tick interval, never zero.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Grace period for in-flight calls.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["viewsync"]);
        assert_eq!(args.port, DEFAULT_PORT);
        assert!(args.bind.is_loopback());
        assert_eq!(args.tick_interval(), Duration::from_millis(20));
        assert_eq!(args.shutdown_grace(), Duration::from_secs(2));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "viewsync",
            "--port",
            "6000",
            "--bind",
            "0.0.0.0",
            "--tick-ms",
            "0",
        ]);
        assert_eq!(args.socket_addr().to_string(), "0.0.0.0:6000");
        assert_eq!(args.tick_interval(), Duration::from_millis(1));
    }
}
