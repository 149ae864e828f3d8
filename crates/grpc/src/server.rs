//! Composition and lifecycle of the Kestrel gRPC server.
//!
//! The server is plaintext only: it must sit behind a TLS-terminating proxy and must not be
//! exposed to the public internet directly.

use std::net::SocketAddr;
use std::sync::Arc;

use kestrel_pool_api::TransactionPool;
use kestrel_provider::api::block::{BlockProvider, HeadSubscriptionProvider};
use kestrel_provider::ProviderFactory;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tonic::transport::server::{Routes, TcpIncoming};
use tonic::transport::Server;
use tracing::{error, info, warn};

use crate::config::GrpcConfig;
use crate::dispatcher::{ApiKind, ApiRegistry, DeadlineLayer, DispatcherMetrics, StatsSnapshot};
use crate::handlers::{BlockHandler, BroadcastHandler};
use crate::protos::block::block_service_server::BlockServiceServer;
use crate::protos::broadcast::broadcast_api_server::BroadcastApiServer;

/// Errors from building or running the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server was built without any API to serve.
    #[error("gRPC server has no registered API")]
    EmptyServer,

    /// The serving task is already gone.
    #[error("gRPC server is not running")]
    AlreadyStopped,

    /// Binding the listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to accept on the listener: {0}")]
    Incoming(String),
}

/// Handle to a started server. Cloning it is cheap; every clone controls the same server.
#[derive(Debug, Clone)]
pub struct GrpcServerHandle {
    /// Bound address, with the port resolved.
    addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<()>>,
    metrics: Arc<DispatcherMetrics>,
}

impl GrpcServerHandle {
    /// Address the server accepts connections on.
    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    /// Signals the server to shut down. Use [`stopped`](Self::stopped) to wait for it.
    pub fn stop(&self) -> Result<(), Error> {
        self.shutdown_tx.send(()).map_err(|_| Error::AlreadyStopped)
    }

    /// Resolves once the serving task has exited.
    pub async fn stopped(&self) {
        self.shutdown_tx.closed().await
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown_tx.is_closed()
    }

    /// Returns the totals of the calls served so far, as recorded in the server's metrics.
    pub fn stats(&self) -> StatsSnapshot {
        self.metrics.snapshot()
    }
}

/// Collects the APIs a server exposes.
///
/// Each API is registered at most once. Registering an API again keeps the first handler.
#[derive(Debug, Clone, Default)]
pub struct GrpcServerBuilder {
    routes: Routes,
    registry: ApiRegistry,
    config: GrpcConfig,
}

impl GrpcServerBuilder {
    pub fn new(config: GrpcConfig) -> Self {
        Self { routes: Routes::default(), registry: ApiRegistry::default(), config }
    }

    /// Registers the broadcast API.
    pub fn broadcast<P>(self, handler: BroadcastHandler<P>) -> Self
    where
        P: TransactionPool + 'static,
    {
        self.service(ApiKind::Broadcast, BroadcastApiServer::new(handler))
    }

    /// Registers the block query API. The handler's range limit is taken from the server
    /// configuration.
    pub fn block<PF>(self, handler: BlockHandler<PF>) -> Self
    where
        PF: ProviderFactory + HeadSubscriptionProvider + 'static,
        PF::Provider: BlockProvider,
    {
        let handler = handler.with_max_range(self.config.max_block_range);
        self.service(ApiKind::Block, BlockServiceServer::new(handler))
    }

    fn service<S>(mut self, kind: ApiKind, service: S) -> Self
    where
        S: tower::Service<
                http::Request<tonic::transport::Body>,
                Response = http::Response<tonic::body::BoxBody>,
                Error = std::convert::Infallible,
            > + tonic::server::NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        debug_assert_eq!(S::NAME, kind.service_name());
        if self.registry.register(kind) {
            self.routes = self.routes.add_service(service);
        } else {
            warn!(target: "grpc", api = %kind, "API already registered, ignoring.");
        }
        self
    }

    /// Builds the server. Fails if no API was registered.
    pub fn build(self) -> Result<GrpcServer, Error> {
        if self.registry.is_empty() {
            return Err(Error::EmptyServer);
        }
        Ok(GrpcServer { routes: self.routes, registry: self.registry, config: self.config })
    }
}

/// A gRPC server with at least one registered API, ready to be started.
#[derive(Debug, Clone)]
pub struct GrpcServer {
    routes: Routes,
    registry: ApiRegistry,
    config: GrpcConfig,
}

impl GrpcServer {
    /// Shorthand for [`GrpcServerBuilder::new`].
    pub fn builder(config: GrpcConfig) -> GrpcServerBuilder {
        GrpcServerBuilder::new(config)
    }

    pub fn config(&self) -> &GrpcConfig {
        &self.config
    }

    pub fn apis(&self) -> impl Iterator<Item = ApiKind> + '_ {
        self.registry.iter()
    }

    /// Binds `addr` and serves the registered APIs on a background task.
    ///
    /// Connections are accepted as soon as this returns. Port `0` binds an ephemeral port, see
    /// [`GrpcServerHandle::addr`].
    pub async fn start(&self, addr: SocketAddr) -> Result<GrpcServerHandle, Error> {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());

        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|err| Error::Incoming(err.to_string()))?;

        let metrics = Arc::new(DispatcherMetrics::new());
        let layer =
            DeadlineLayer::new(self.config.timeout, self.registry.clone(), Arc::clone(&metrics))
                .with_client_margin(self.config.deadline_margin);

        let mut builder =
            Server::builder().max_concurrent_streams(self.config.max_concurrent_streams);
        if let Some(limit) = self.config.concurrency_limit_per_connection {
            builder = builder.concurrency_limit_per_connection(limit);
        }
        let server = builder.layer(layer).add_routes(self.routes.clone());

        tokio::spawn(async move {
            let signal = async move {
                // a dropped handle counts as a shutdown request too
                shutdown_rx.changed().await.ok();
            };
            if let Err(error) = server.serve_with_incoming_shutdown(incoming, signal).await {
                error!(target: "grpc", %error, "gRPC server error.");
            }
        });

        let apis = self.registry.iter().map(|api| api.to_string()).collect::<Vec<_>>();
        info!(target: "grpc", addr = %bound, ?apis, "gRPC server started.");

        Ok(GrpcServerHandle { addr: bound, shutdown_tx: Arc::new(shutdown_tx), metrics })
    }
}
