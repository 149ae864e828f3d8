mod types;

pub use types::*;

pub const BROADCAST_SERVICE: &str = "kestrel.rpc.grpc.BroadcastApi";
pub const BLOCK_SERVICE: &str = "kestrel.rpc.grpc.BlockService";

/// Broadcast service definitions.
pub mod broadcast {
    include!(concat!(env!("OUT_DIR"), "/kestrel.rpc.grpc.BroadcastApi.rs"));
}

/// Block query service definitions.
pub mod block {
    include!(concat!(env!("OUT_DIR"), "/kestrel.rpc.grpc.BlockService.rs"));
}
