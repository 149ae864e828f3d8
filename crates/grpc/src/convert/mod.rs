//! Conversions between the wire messages and Kestrel types.

mod admission;
mod block;

pub use block::{block_query_from_proto, block_response, RequestedBlock};
