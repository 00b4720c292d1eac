//! Token store backends for persisting the session's token pair.
//!
//! Provides the [`TokenStore`] trait and implementations:
//! - [`FileTokenStore`] - JSON file with 0600 permissions
//! - [`MemoryTokenStore`] - In-memory (testing)

mod file;
mod memory;

use async_trait::async_trait;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use crate::error::Result;
use crate::models::tokens::TokenPair;

/// Trait for token store backends.
///
/// The store owns the single authoritative copy of the session's token pair.
/// Each operation is atomic: a concurrent reader observes either the previous
/// pair or the fully replaced one, never a partial write.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored token pair, if a session exists.
    async fn load(&self) -> Result<Option<TokenPair>>;

    /// Replace the stored token pair.
    async fn store(&self, tokens: &TokenPair) -> Result<()>;

    /// Remove the stored token pair, ending the session.
    async fn clear(&self) -> Result<()>;

    /// Check whether a session is stored.
    async fn exists(&self) -> Result<bool> {
        Ok(self.load().await?.is_some())
    }

    /// Name of this store backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for std::sync::Arc<T> {
    async fn load(&self) -> Result<Option<TokenPair>> {
        (**self).load().await
    }
    async fn store(&self, tokens: &TokenPair) -> Result<()> {
        (**self).store(tokens).await
    }
    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Blanket impl for `Box<T>`.
#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    async fn load(&self) -> Result<Option<TokenPair>> {
        (**self).load().await
    }
    async fn store(&self, tokens: &TokenPair) -> Result<()> {
        (**self).store(tokens).await
    }
    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
