//! The refresh-exchange contract.

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::RefreshError;
use crate::models::tokens::TokenPair;

/// Performs the refresh exchange against the identity provider.
///
/// Implementations receive the full current pair (including the refresh
/// credential) and must return a complete replacement pair. Failures are
/// reported through the closed [`RefreshError`] set so the broker can
/// classify them without inspecting message text.
///
/// The returned pair must carry the previous `clock_drift_ms` unchanged
/// unless the implementation computes a fresh value.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange the current tokens for a fresh pair.
    async fn refresh(
        &self,
        current: &TokenPair,
        config: &ProviderConfig,
    ) -> Result<TokenPair, RefreshError>;
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for std::sync::Arc<T> {
    async fn refresh(
        &self,
        current: &TokenPair,
        config: &ProviderConfig,
    ) -> Result<TokenPair, RefreshError> {
        (**self).refresh(current, config).await
    }
}
