//! Wire messages of the Kestrel gRPC API.

use prost::bytes::Bytes;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BroadcastTxRequest {
    /// Raw transaction payload.
    #[prost(bytes = "bytes", tag = "1")]
    pub tx: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BroadcastTxResponse {
    /// `0` when the transaction was accepted, otherwise the admission error code.
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    #[prost(enumeration = "AdmissionStatus", tag = "3")]
    pub status: i32,
    /// Zero-based position in the pending queue. Only set for accepted transactions.
    #[prost(uint64, optional, tag = "4")]
    pub queue_position: Option<u64>,
    #[prost(string, tag = "5")]
    pub log: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AdmissionStatus {
    Unspecified = 0,
    Accepted = 1,
    Duplicate = 2,
    Full = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NumUnconfirmedTxsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NumUnconfirmedTxsResponse {
    #[prost(uint64, tag = "1")]
    pub n_txs: u64,
    #[prost(uint64, tag = "2")]
    pub total_bytes: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(uint64, tag = "2")]
    pub height: u64,
    /// Milliseconds since the unix epoch.
    #[prost(uint64, tag = "3")]
    pub time: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub last_block_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub data_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub proposer_address: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitSig {
    #[prost(bytes = "vec", tag = "1")]
    pub validator_address: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub timestamp: u64,
    #[prost(bytes = "bytes", tag = "3")]
    pub signature: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Commit {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(uint32, tag = "2")]
    pub round: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub block_hash: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub signatures: Vec<CommitSig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub header: Option<Header>,
    #[prost(bytes = "bytes", repeated, tag = "3")]
    pub txs: Vec<Bytes>,
    #[prost(message, optional, tag = "4")]
    pub commit: Option<Commit>,
}

/// Selects a block by height, by hash, or both. An empty request selects the latest block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetBlockRequest {
    #[prost(int64, optional, tag = "1")]
    pub height: Option<i64>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub hash: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetBlockResponse {
    #[prost(oneof = "get_block_response::Result", tags = "1, 2, 3")]
    pub result: Option<get_block_response::Result>,
    /// `0` when a block is returned, otherwise the code of the miss.
    #[prost(uint32, tag = "4")]
    pub code: u32,
}

pub mod get_block_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Block(super::Block),
        #[prost(message, tag = "2")]
        NotFound(super::BlockNotFound),
        #[prost(message, tag = "3")]
        Pending(super::BlockPending),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockNotFound {}

/// The requested height is above the latest committed block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockPending {
    #[prost(uint64, tag = "1")]
    pub requested: u64,
    #[prost(uint64, tag = "2")]
    pub latest: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLatestHeightRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLatestHeightResponse {
    #[prost(uint64, tag = "1")]
    pub height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchLatestHeightRequest {}

/// Inclusive range of heights. The end is clamped to the latest committed block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetBlockRangeRequest {
    #[prost(uint64, tag = "1")]
    pub start: u64,
    #[prost(uint64, tag = "2")]
    pub end: u64,
}
