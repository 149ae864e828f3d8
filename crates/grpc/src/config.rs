//! gRPC server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use kestrel_primitives::serde_utils::{duration_millis, duration_secs};
use serde::{Deserialize, Serialize};

use crate::handlers::DEFAULT_MAX_BLOCK_RANGE;

/// Default gRPC server listening address.
pub const DEFAULT_GRPC_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default gRPC server listening port.
pub const DEFAULT_GRPC_PORT: u16 = 5051;

/// Default per-call deadline in seconds.
pub const DEFAULT_GRPC_TIMEOUT_SECS: u64 = 20;

/// Default head start the server takes on a client's deadline, in milliseconds.
pub const DEFAULT_DEADLINE_MARGIN_MILLIS: u64 = 20;

/// Configuration for the gRPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    /// The IP address to bind the server to.
    pub addr: IpAddr,
    /// The port to listen on.
    pub port: u16,
    /// Upper bound of every call's deadline. Clients may only lower it.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Subtracted from a client's `grpc-timeout` to get the call's deadline. The client's own
    /// timer starts before the request is sent, so the server must answer ahead of it for the
    /// client to see `DEADLINE_EXCEEDED` rather than a local cancellation.
    #[serde(with = "duration_millis")]
    pub deadline_margin: Duration,
    /// Maximum number of concurrent HTTP/2 streams per connection.
    pub max_concurrent_streams: Option<u32>,
    /// Maximum number of calls served concurrently on a single connection.
    pub concurrency_limit_per_connection: Option<usize>,
    /// Maximum number of blocks a single range request may span.
    pub max_block_range: u64,
}

impl GrpcConfig {
    /// Creates a new gRPC configuration with the given address and port.
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port, ..Default::default() }
    }

    /// Sets the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    pub fn with_max_concurrent_streams(mut self, max: u32) -> Self {
        self.max_concurrent_streams = Some(max);
        self
    }

    pub fn with_concurrency_limit_per_connection(mut self, limit: usize) -> Self {
        self.concurrency_limit_per_connection = Some(limit);
        self
    }

    pub fn with_max_block_range(mut self, max: u64) -> Self {
        self.max_block_range = max;
        self
    }

    /// Returns the socket address for the server.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_GRPC_ADDR,
            port: DEFAULT_GRPC_PORT,
            timeout: Duration::from_secs(DEFAULT_GRPC_TIMEOUT_SECS),
            deadline_margin: Duration::from_millis(DEFAULT_DEADLINE_MARGIN_MILLIS),
            max_concurrent_streams: None,
            concurrency_limit_per_connection: None,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn partial_toml() {
        let config: GrpcConfig = toml::from_str(
            r#"
            port = 9090
            timeout = 5
            deadline_margin = 50
            max_concurrent_streams = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.deadline_margin, Duration::from_millis(50));
        assert_eq!(config.max_concurrent_streams, Some(64));
        assert_eq!(config.addr, DEFAULT_GRPC_ADDR);
        assert_eq!(config.max_block_range, DEFAULT_MAX_BLOCK_RANGE);
    }

    #[test]
    fn socket_addr() {
        let config = GrpcConfig::new("0.0.0.0".parse().unwrap(), 0);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:0");
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_GRPC_TIMEOUT_SECS));
    }
}
