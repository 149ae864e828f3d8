use std::sync::Arc;

use kestrel_primitives::block::{BlockQuery, Commit, CommitSig, CommittedBlock, Header};
use kestrel_primitives::B256;
use kestrel_provider::ReadError;
use tonic::Status;

use crate::error::{read_error, ErrorCode};
use crate::protos::{self, get_block_response, GetBlockRequest, GetBlockResponse};

impl From<&Header> for protos::Header {
    fn from(header: &Header) -> Self {
        Self {
            chain_id: header.chain_id.clone(),
            height: header.height,
            time: header.time,
            last_block_hash: header.last_block_hash.to_vec(),
            data_hash: header.data_hash.to_vec(),
            proposer_address: header.proposer_address.to_vec(),
        }
    }
}

impl From<&CommitSig> for protos::CommitSig {
    fn from(sig: &CommitSig) -> Self {
        Self {
            validator_address: sig.validator_address.to_vec(),
            timestamp: sig.timestamp,
            signature: sig.signature.clone(),
        }
    }
}

impl From<&Commit> for protos::Commit {
    fn from(commit: &Commit) -> Self {
        Self {
            height: commit.height,
            round: commit.round,
            block_hash: commit.block_hash.to_vec(),
            signatures: commit.signatures.iter().map(Into::into).collect(),
        }
    }
}

impl From<&CommittedBlock> for protos::Block {
    fn from(block: &CommittedBlock) -> Self {
        Self {
            hash: block.hash().to_vec(),
            header: Some((&block.block.header).into()),
            txs: block.block.body.iter().map(|tx| tx.payload().clone()).collect(),
            commit: Some((&block.commit).into()),
        }
    }
}

/// The block a [`GetBlockRequest`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedBlock {
    Query(BlockQuery),
    /// The request carries a hash that isn't 32 bytes long, so it can't match any block. The
    /// height, if set, still decides whether the miss is reported as pending.
    MalformedHash { height: Option<i64> },
}

pub fn block_query_from_proto(request: &GetBlockRequest) -> RequestedBlock {
    let hash = match request.hash.as_deref().map(B256::try_from_slice) {
        Some(Some(hash)) => Some(hash),
        Some(None) => return RequestedBlock::MalformedHash { height: request.height },
        None => None,
    };
    RequestedBlock::Query(BlockQuery { height: request.height, hash })
}

/// Converts the outcome of a block read into a response. Misses become typed results, only a
/// halted reader fails the call.
pub fn block_response(
    result: Result<Arc<CommittedBlock>, ReadError>,
) -> Result<GetBlockResponse, Status> {
    let (result, code) = match result {
        Ok(block) => (get_block_response::Result::Block(block.as_ref().into()), ErrorCode::Ok),

        Err(ReadError::NotFound) => {
            (get_block_response::Result::NotFound(protos::BlockNotFound {}), ErrorCode::BlockNotFound)
        }

        Err(ReadError::Pending { requested, latest }) => (
            get_block_response::Result::Pending(protos::BlockPending { requested, latest }),
            ErrorCode::BlockPending,
        ),

        Err(err @ ReadError::Halted { .. }) => return Err(read_error(err)),
    };

    Ok(GetBlockResponse { result: Some(result), code: code.code() })
}
