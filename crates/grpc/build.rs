//! Generates the service and client glue for the Kestrel gRPC API.
//!
//! The wire messages are hand-written prost types in `src/protos/types.rs`, so only the service
//! traits, servers and clients are generated here. This needs no `protoc`.

use tonic_build::manual::{Builder, Method, Service};

const PACKAGE: &str = "kestrel.rpc.grpc";
const CODEC: &str = "tonic::codec::ProstCodec";

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::protos::{input}"))
        .output_type(format!("crate::protos::{output}"))
        .codec_path(CODEC)
        .build()
}

fn streaming_method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::protos::{input}"))
        .output_type(format!("crate::protos::{output}"))
        .codec_path(CODEC)
        .server_streaming()
        .build()
}

fn main() {
    let broadcast = Service::builder()
        .name("BroadcastApi")
        .package(PACKAGE)
        .method(method("ping", "Ping", "PingRequest", "PingResponse"))
        .method(method("broadcast_tx", "BroadcastTx", "BroadcastTxRequest", "BroadcastTxResponse"))
        .method(method(
            "num_unconfirmed_txs",
            "NumUnconfirmedTxs",
            "NumUnconfirmedTxsRequest",
            "NumUnconfirmedTxsResponse",
        ))
        .build();

    let block = Service::builder()
        .name("BlockService")
        .package(PACKAGE)
        .method(method("get_block", "GetBlock", "GetBlockRequest", "GetBlockResponse"))
        .method(method(
            "get_latest_height",
            "GetLatestHeight",
            "GetLatestHeightRequest",
            "GetLatestHeightResponse",
        ))
        .method(streaming_method(
            "watch_latest_height",
            "WatchLatestHeight",
            "WatchLatestHeightRequest",
            "GetLatestHeightResponse",
        ))
        .method(streaming_method(
            "get_block_range",
            "GetBlockRange",
            "GetBlockRangeRequest",
            "GetBlockResponse",
        ))
        .build();

    Builder::new().compile(&[broadcast, block]);

    println!("cargo:rerun-if-changed=build.rs");
}
