//! Broadcast service handler implementation.

use kestrel_pool_api::validation::Validator;
use kestrel_pool_api::TransactionPool;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::error::invalid_transaction;
use crate::protos::broadcast::broadcast_api_server::BroadcastApi;
use crate::protos::{
    BroadcastTxRequest, BroadcastTxResponse, NumUnconfirmedTxsRequest, NumUnconfirmedTxsResponse,
    PingRequest, PingResponse,
};

/// Handler of the broadcast API, backed by a transaction pool.
///
/// Admission is synchronous and atomic, so a call that is cancelled mid-way has either admitted
/// the transaction or left the pool untouched.
#[derive(Debug)]
pub struct BroadcastHandler<P> {
    pool: P,
}

impl<P> BroadcastHandler<P> {
    pub fn new(pool: P) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

impl<P: Clone> Clone for BroadcastHandler<P> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone() }
    }
}

#[tonic::async_trait]
impl<P> BroadcastApi for BroadcastHandler<P>
where
    P: TransactionPool + 'static,
{
    async fn ping(&self, _: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        Ok(Response::new(PingResponse {}))
    }

    async fn broadcast_tx(
        &self,
        request: Request<BroadcastTxRequest>,
    ) -> Result<Response<BroadcastTxResponse>, Status> {
        let payload = request.into_inner().tx;
        let size = payload.len();

        let tx = self.pool.validator().validate(payload).map_err(|error| {
            debug!(target: "grpc", size, %error, "Rejected invalid transaction.");
            invalid_transaction(&error)
        })?;

        let result = self.pool.add_transaction(tx);
        Ok(Response::new(BroadcastTxResponse::from(result)))
    }

    async fn num_unconfirmed_txs(
        &self,
        _: Request<NumUnconfirmedTxsRequest>,
    ) -> Result<Response<NumUnconfirmedTxsResponse>, Status> {
        Ok(Response::new(NumUnconfirmedTxsResponse {
            n_txs: self.pool.size() as u64,
            total_bytes: self.pool.size_bytes() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use kestrel_pool::{PoolConfig, TxPool};
    use kestrel_pool_api::TransactionPool;
    use tonic::{Code, Request};

    use super::BroadcastHandler;
    use crate::error::ErrorCode;
    use crate::protos::broadcast::broadcast_api_server::BroadcastApi;
    use crate::protos::{AdmissionStatus, BroadcastTxRequest, NumUnconfirmedTxsRequest};

    fn handler(config: PoolConfig) -> BroadcastHandler<TxPool> {
        BroadcastHandler::new(TxPool::from_config(config))
    }

    fn broadcast(payload: &'static [u8]) -> Request<BroadcastTxRequest> {
        Request::new(BroadcastTxRequest { tx: payload.into() })
    }

    #[tokio::test]
    async fn accepts_then_reports_duplicate() {
        let handler = handler(PoolConfig::default());

        let first = handler.broadcast_tx(broadcast(b"a=1")).await.unwrap().into_inner();
        assert_eq!(first.status(), AdmissionStatus::Accepted);
        assert_eq!(first.queue_position, Some(0));

        let second = handler.broadcast_tx(broadcast(b"b=2")).await.unwrap().into_inner();
        assert_eq!(second.queue_position, Some(1));

        let again = handler.broadcast_tx(broadcast(b"a=1")).await.unwrap().into_inner();
        assert_eq!(again.status(), AdmissionStatus::Duplicate);
        assert_eq!(again.code, ErrorCode::Duplicate.code());

        let count = handler
            .num_unconfirmed_txs(Request::new(NumUnconfirmedTxsRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(count.n_txs, 2);
        assert_eq!(count.total_bytes, 6);
    }

    #[tokio::test]
    async fn full_pool() {
        let handler = handler(PoolConfig::default().with_max_txs(1));

        handler.broadcast_tx(broadcast(b"a=1")).await.unwrap();
        let response = handler.broadcast_tx(broadcast(b"b=2")).await.unwrap().into_inner();

        assert_eq!(response.status(), AdmissionStatus::Full);
        assert_eq!(response.code, ErrorCode::PoolFull.code());
        assert_eq!(handler.pool().size(), 1);
    }

    #[tokio::test]
    async fn invalid_payloads_are_rejected() {
        let handler = handler(PoolConfig::default().with_max_tx_bytes(4));

        let empty = handler.broadcast_tx(broadcast(b"")).await.unwrap_err();
        assert_eq!(empty.code(), Code::InvalidArgument);
        assert_eq!(ErrorCode::from_status(&empty), Some(ErrorCode::EmptyTransaction));

        let too_large = handler.broadcast_tx(broadcast(b"key=value")).await.unwrap_err();
        assert_eq!(ErrorCode::from_status(&too_large), Some(ErrorCode::TransactionTooLarge));

        assert_eq!(handler.pool().size(), 0);
    }
}
