//! gRPC front door of a Kestrel node.
//!
//! The server exposes two APIs over a single listener:
//!
//! - the broadcast API, which validates raw transactions and admits them into the node's pool,
//! - the block API, which serves committed blocks from the block store.
//!
//! Every call is bounded by a deadline and counted in the server's metrics, see [`dispatcher`].
//! Failures carry a stable [`ErrorCode`] in the `x-kestrel-code` response metadata next to the
//! gRPC status code.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod client;
mod config;
mod convert;
mod error;
mod handlers;
mod server;

pub mod dispatcher;
pub mod protos;

pub use client::{Error as ClientError, GrpcClient, GrpcClientBuilder};
pub use config::GrpcConfig;
pub use dispatcher::{ApiKind, DispatcherMetrics, StatsSnapshot};
pub use error::{ErrorCode, CODE_METADATA_KEY};
pub use handlers::{BlockHandler, BroadcastHandler, DEFAULT_MAX_BLOCK_RANGE};
pub use server::{Error, GrpcServer, GrpcServerBuilder, GrpcServerHandle};
