#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use kestrel_provider_api::{ProviderError, ProviderResult};

// Re-export the API module
pub mod api {
    pub use kestrel_provider_api::*;
}

pub mod providers;
pub mod reader;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use providers::in_memory::MemoryProviderFactory;
pub use reader::{BlockReader, ReadError, ReadSnapshot};

#[auto_impl::auto_impl(&, Box, Arc)]
pub trait ProviderFactory: Send + Sync {
    type Provider;
    type ProviderMut;

    /// Returns a read-only provider pinned to the latest committed version of the store.
    fn provider(&self) -> Self::Provider;

    /// Returns a provider whose writes are staged until it is committed.
    fn provider_mut(&self) -> Self::ProviderMut;
}
