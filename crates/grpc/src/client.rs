//! Typed client for the Kestrel gRPC APIs.

use std::time::Duration;

use tonic::codec::Streaming;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{IntoRequest, Response, Status};

use crate::protos::block::block_service_client::BlockServiceClient;
use crate::protos::broadcast::broadcast_api_client::BroadcastApiClient;
use crate::protos::{
    BroadcastTxRequest, BroadcastTxResponse, GetBlockRangeRequest, GetBlockRequest,
    GetBlockResponse, GetLatestHeightRequest, GetLatestHeightResponse, NumUnconfirmedTxsRequest,
    NumUnconfirmedTxsResponse, PingRequest, PingResponse, WatchLatestHeightRequest,
};

/// Client-side bound of each request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from connecting a [`GrpcClient`]. Failed calls are reported as [`Status`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid endpoint: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
}

/// Configures the channel of a [`GrpcClient`].
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use kestrel_grpc::GrpcClient;
///
/// let client = GrpcClient::builder("http://localhost:5051")
///     .timeout(Duration::from_secs(30))
///     .connect()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct GrpcClientBuilder {
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl GrpcClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the request timeout, [`DEFAULT_TIMEOUT`] by default.
    ///
    /// This bounds the client side only. To have the server give up on a call as well, set a
    /// deadline on the request with [`tonic::Request::set_timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long establishing the connection may take, [`DEFAULT_CONNECT_TIMEOUT`] by
    /// default.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Opens the channel. Fails if the endpoint isn't reachable within the connect timeout.
    pub async fn connect(self) -> Result<GrpcClient, Error> {
        let endpoint: Uri = self.endpoint.parse()?;
        let channel = Endpoint::from(endpoint)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .connect()
            .await?;

        Ok(GrpcClient::from_channel(channel))
    }
}

/// A client for a Kestrel node's gRPC endpoints.
///
/// Calls to an API the server doesn't expose fail with `UNIMPLEMENTED`.
#[derive(Debug, Clone)]
pub struct GrpcClient {
    broadcast: BroadcastApiClient<Channel>,
    block: BlockServiceClient<Channel>,
}

impl GrpcClient {
    /// Creates a new client builder for the specified endpoint, eg. `http://localhost:5051`.
    pub fn builder(endpoint: impl Into<String>) -> GrpcClientBuilder {
        GrpcClientBuilder::new(endpoint)
    }

    /// Connects with the default timeouts.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, Error> {
        Self::builder(endpoint).connect().await
    }

    /// Builds a client on top of an already configured channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            broadcast: BroadcastApiClient::new(channel.clone()),
            block: BlockServiceClient::new(channel),
        }
    }

    pub async fn ping(&mut self) -> Result<Response<PingResponse>, Status> {
        self.broadcast.ping(PingRequest {}).await
    }

    /// Submits a raw transaction to the node's pool.
    ///
    /// A duplicate or a full pool is reported in the response. Only payloads that fail
    /// validation are returned as an error status.
    pub async fn broadcast_tx(
        &mut self,
        request: impl IntoRequest<BroadcastTxRequest>,
    ) -> Result<Response<BroadcastTxResponse>, Status> {
        self.broadcast.broadcast_tx(request).await
    }

    pub async fn num_unconfirmed_txs(
        &mut self,
    ) -> Result<Response<NumUnconfirmedTxsResponse>, Status> {
        self.broadcast.num_unconfirmed_txs(NumUnconfirmedTxsRequest {}).await
    }

    /// Gets a committed block by height or hash.
    pub async fn get_block(
        &mut self,
        request: impl IntoRequest<GetBlockRequest>,
    ) -> Result<Response<GetBlockResponse>, Status> {
        self.block.get_block(request).await
    }

    pub async fn get_latest_height(
        &mut self,
    ) -> Result<Response<GetLatestHeightResponse>, Status> {
        self.block.get_latest_height(GetLatestHeightRequest {}).await
    }

    /// Streams the latest height, starting with the current one, until the call's deadline.
    pub async fn watch_latest_height(
        &mut self,
        request: impl IntoRequest<WatchLatestHeightRequest>,
    ) -> Result<Response<Streaming<GetLatestHeightResponse>>, Status> {
        self.block.watch_latest_height(request).await
    }

    /// Streams the blocks of an inclusive height range, in ascending order.
    pub async fn get_block_range(
        &mut self,
        request: impl IntoRequest<GetBlockRangeRequest>,
    ) -> Result<Response<Streaming<GetBlockResponse>>, Status> {
        self.block.get_block_range(request).await
    }
}
