//! In-memory token store for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::TokenStore;
use crate::error::Result;
use crate::models::tokens::TokenPair;

/// In-memory token store, primarily for testing.
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(None),
        }
    }

    /// Create a store seeded with a token pair.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>> {
        Ok(self.tokens.read().await.clone())
    }

    async fn store(&self, tokens: &TokenPair) -> Result<()> {
        *self.tokens.write().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.tokens.write().await = None;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.tokens.read().await.is_some())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
