//! Error types for token-broker.

use std::path::PathBuf;
use thiserror::Error;

/// Typed failure raised by a [`TokenRefresher`](crate::auth::TokenRefresher).
///
/// The broker classifies refresh outcomes by variant, never by message text,
/// so refresher implementations must map their transport into this closed set.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Transient network failure - the cached tokens may still be usable once
    /// connectivity returns, so the broker leaves the store intact.
    #[error("network failure during token refresh: {0}")]
    Network(String),

    /// The identity provider rejected the refresh credential itself
    /// (revoked or expired refresh token). This ends the session.
    #[error("refresh credential rejected: {0}")]
    Unauthorized(String),

    /// Any other provider-side failure.
    #[error("token refresh failed: {0}")]
    Provider(String),
}

impl RefreshError {
    /// Returns true for transient network failures that must not clear the
    /// cached tokens.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, RefreshError::Network(_))
    }

    /// Returns true when the provider ended the session by rejecting the
    /// refresh credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RefreshError::Unauthorized(_))
    }
}

/// The main error type for token-broker.
#[derive(Debug, Error)]
pub enum Error {
    // ── Refresh ──────────────────────────────────────────────────────────────
    /// A refresh attempt failed with a fatal, surfaced classification.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    // ── Tokens ───────────────────────────────────────────────────────────────
    /// A bearer token could not be decoded into its payload claims.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    /// Storage I/O error.
    #[error("storage I/O error at {path}: {message}")]
    StorageIo {
        /// Path that caused the error.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// Storage serialization error.
    #[error("storage serialization error: {0}")]
    StorageSerialization(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Storage(String),

    // ── Configuration ────────────────────────────────────────────────────────
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a storage I/O error.
    #[must_use]
    pub fn storage_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StorageIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, Error>;
