//! # token-broker
//!
//! Credential lifecycle broker for bearer-token sessions.
//!
//! Maintains a locally cached pair of bearer tokens (identity + access)
//! issued by a remote identity provider, decides when they are stale, and
//! coordinates their refresh so concurrent callers observe one consistent
//! outcome. Persistence, the refresh exchange, inflight-exchange
//! coordination, and event consumption are injected behind traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use token_broker::{
//!     FileTokenStore, GetTokensOptions, HttpTokenRefresher, ProviderConfig, Result, TokenBroker,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let broker = TokenBroker::new(
//!         Arc::new(FileTokenStore::default_path()?),
//!         Arc::new(HttpTokenRefresher::new()),
//!     )
//!     .with_config(ProviderConfig::new(
//!         "https://auth.example.com/oauth2/token",
//!         "my-client-id",
//!     ));
//!
//!     // None means no usable session: not configured, signed out, or the
//!     // provider ended the session.
//!     if let Some(session) = broker.get_tokens(GetTokensOptions::default()).await? {
//!         println!("access token: {}", session.access_token.as_str());
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;

// Re-exports for ergonomic usage
pub use auth::{
    ExchangeGate, ExchangeGuard, GetTokensOptions, HttpTokenRefresher, InflightWaiter, NoopWaiter,
    TokenBroker, TokenRefresher,
};
pub use config::ProviderConfig;
pub use error::{Error, RefreshError, Result};
pub use events::{EventBus, EventSink, SessionEvent};
pub use models::tokens::{BearerToken, SessionTokens, TokenClaims, TokenPair};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
