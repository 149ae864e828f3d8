#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod block;
pub mod hash;
pub mod merkle;
pub mod serde_utils;
pub mod transaction;

pub use hash::B256;
