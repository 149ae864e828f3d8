//! gRPC service handlers.
//!
//! The handlers translate between the wire messages and the node components: broadcasts go to
//! the transaction pool, block queries to the block store reader.

mod block;
mod broadcast;

pub use self::block::{BlockHandler, DEFAULT_MAX_BLOCK_RANGE};
pub use self::broadcast::BroadcastHandler;
