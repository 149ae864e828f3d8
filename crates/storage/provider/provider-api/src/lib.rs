//! Storage contract between the block store and its readers.
//!
//! A reader obtains a provider pinned to one committed version of the chain. A writer stages its
//! changes and publishes them all at once through
//! [`MutableProvider::commit`](block::MutableProvider::commit).

pub mod block;
mod error;

pub use error::ProviderError;

/// A result type for blockchain providers.
pub type ProviderResult<T> = Result<T, error::ProviderError>;
