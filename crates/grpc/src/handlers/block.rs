//! Block service handler implementation.

use std::sync::Arc;

use kestrel_primitives::block::{BlockNumber, BlockQuery, CommittedBlock};
use kestrel_provider::api::block::{BlockProvider, HeadSubscriptionProvider};
use kestrel_provider::{BlockReader, ProviderFactory, ReadError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, trace};

use crate::convert::{block_query_from_proto, block_response, RequestedBlock};
use crate::dispatcher::CallDeadline;
use crate::error::{deadline_exceeded, invalid_range, read_error, IntoGrpcResult};
use crate::protos::block::block_service_server::BlockService;
use crate::protos::{
    GetBlockRangeRequest, GetBlockRequest, GetBlockResponse, GetLatestHeightRequest,
    GetLatestHeightResponse, WatchLatestHeightRequest,
};

/// Default maximum number of blocks a single range request may span.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 100;

/// Number of messages buffered per stream before the producer waits for the client.
const STREAM_BUFFER: usize = 16;

/// Handler of the block service, backed by a [`BlockReader`].
///
/// Reads run on the blocking thread pool. Each call pins one snapshot of the chain, so a
/// response never mixes blocks from before and after a concurrent commit.
pub struct BlockHandler<PF> {
    reader: BlockReader<PF>,
    max_range: u64,
}

impl<PF> BlockHandler<PF>
where
    PF: ProviderFactory,
    PF::Provider: BlockProvider,
{
    pub fn new(reader: BlockReader<PF>) -> Self {
        Self { reader, max_range: DEFAULT_MAX_BLOCK_RANGE }
    }

    /// Sets the maximum number of blocks a range request may span.
    pub fn with_max_range(mut self, max_range: u64) -> Self {
        self.max_range = max_range.max(1);
        self
    }

    pub fn reader(&self) -> &BlockReader<PF> {
        &self.reader
    }
}

impl<PF> BlockHandler<PF>
where
    PF: ProviderFactory + 'static,
    PF::Provider: BlockProvider,
{
    /// Runs a read on the blocking thread pool.
    async fn on_io_blocking_task<F, T>(&self, func: F) -> Result<T, Status>
    where
        F: FnOnce(BlockReader<PF>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let reader = self.reader.clone();
        tokio::task::spawn_blocking(move || func(reader)).await.into_grpc_result()
    }

    fn validate_range(&self, start: BlockNumber, end: BlockNumber) -> Result<(), Status> {
        if start == 0 {
            return Err(invalid_range("range start must be at least 1"));
        }
        if start > end {
            return Err(invalid_range(format!("range start {start} is above its end {end}")));
        }
        if end - start >= self.max_range {
            return Err(invalid_range(format!(
                "range {start}..={end} spans more than {} blocks",
                self.max_range
            )));
        }
        Ok(())
    }
}

impl<PF> Clone for BlockHandler<PF> {
    fn clone(&self) -> Self {
        Self { reader: self.reader.clone(), max_range: self.max_range }
    }
}

impl<PF: std::fmt::Debug> std::fmt::Debug for BlockHandler<PF> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockHandler")
            .field("reader", &self.reader)
            .field("max_range", &self.max_range)
            .finish()
    }
}

/// Produces the responses of a range request into `tx`, against a single snapshot.
///
/// Stops early if the client goes away or the call deadline passes.
fn produce_range<PF>(
    reader: BlockReader<PF>,
    start: BlockNumber,
    end: BlockNumber,
    deadline: Option<CallDeadline>,
    tx: mpsc::Sender<Result<GetBlockResponse, Status>>,
) where
    PF: ProviderFactory,
    PF::Provider: BlockProvider,
{
    let outcome = reader.snapshot().and_then(|snapshot| {
        let range = snapshot.range(start, end)?;
        for number in range {
            if deadline.is_some_and(|d| d.is_expired()) {
                debug!(target: "grpc", start, end, number, "Block range exceeded its deadline.");
                let status = deadline_exceeded("block range exceeded its deadline");
                let _ = tx.blocking_send(Err(status));
                return Ok(());
            }

            let response = block_response(snapshot.block_by_number(number));
            let failed = response.is_err();
            if tx.blocking_send(response).is_err() {
                trace!(target: "grpc", start, end, number, "Block range stream closed by client.");
                return Ok(());
            }
            if failed {
                return Ok(());
            }
        }
        Ok(())
    });

    // a range that can't start is reported like a point query miss
    if let Err(err) = outcome {
        let response = match err {
            ReadError::Halted { .. } => Err(read_error(err)),
            miss => block_response(Err(miss)),
        };
        let _ = tx.blocking_send(response);
    }
}

#[tonic::async_trait]
impl<PF> BlockService for BlockHandler<PF>
where
    PF: ProviderFactory + HeadSubscriptionProvider + 'static,
    PF::Provider: BlockProvider,
{
    type WatchLatestHeightStream = ReceiverStream<Result<GetLatestHeightResponse, Status>>;
    type GetBlockRangeStream = ReceiverStream<Result<GetBlockResponse, Status>>;

    async fn get_block(
        &self,
        request: Request<GetBlockRequest>,
    ) -> Result<Response<GetBlockResponse>, Status> {
        let requested = block_query_from_proto(request.get_ref());
        let result: Result<Arc<CommittedBlock>, ReadError> = match requested {
            RequestedBlock::Query(query) => {
                self.on_io_blocking_task(move |reader| reader.block(query)).await?
            }

            // a height above the latest one is still pending, whatever the hash
            RequestedBlock::MalformedHash { height: Some(height) } => {
                self.on_io_blocking_task(move |reader| {
                    reader.block(BlockQuery::height(height)).and_then(|_| Err(ReadError::NotFound))
                })
                .await?
            }

            RequestedBlock::MalformedHash { height: None } => Err(ReadError::NotFound),
        };

        block_response(result).map(Response::new)
    }

    async fn get_latest_height(
        &self,
        _: Request<GetLatestHeightRequest>,
    ) -> Result<Response<GetLatestHeightResponse>, Status> {
        let height =
            self.on_io_blocking_task(|reader| reader.latest_number()).await?.into_grpc_result()?;
        Ok(Response::new(GetLatestHeightResponse { height }))
    }

    async fn watch_latest_height(
        &self,
        request: Request<WatchLatestHeightRequest>,
    ) -> Result<Response<Self::WatchLatestHeightStream>, Status> {
        let deadline = request.extensions().get::<CallDeadline>().copied();
        let reader = self.reader.clone();
        let mut heights = reader.subscribe_heights();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let expiry = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline.instant()).await,
                    None => futures::future::pending::<()>().await,
                }
            };
            tokio::pin!(expiry);

            loop {
                let halted = reader.snapshot().err();
                if let Some(err) = halted {
                    let _ = tx.send(Err(read_error(err))).await;
                    break;
                }

                let height = *heights.borrow_and_update();
                if tx.send(Ok(GetLatestHeightResponse { height })).await.is_err() {
                    break;
                }

                tokio::select! {
                    _ = &mut expiry => {
                        let _ = tx.send(Err(deadline_exceeded("watch exceeded its deadline"))).await;
                        break;
                    }
                    _ = tx.closed() => break,
                    changed = heights.changed() => {
                        // the store is gone, no more heights will come
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            trace!(target: "grpc", "Latest height watch ended.");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_block_range(
        &self,
        request: Request<GetBlockRangeRequest>,
    ) -> Result<Response<Self::GetBlockRangeStream>, Status> {
        let deadline = request.extensions().get::<CallDeadline>().copied();
        let GetBlockRangeRequest { start, end } = request.into_inner();
        self.validate_range(start, end)?;

        let reader = self.reader.clone();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || produce_range(reader, start, end, deadline, tx));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
