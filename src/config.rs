//! Identity-provider configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default capacity of the lifecycle event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connect timeout for refresh requests.
pub const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Settings required to talk to the identity provider's token endpoint.
///
/// An absent or invalid configuration is a valid state: the broker treats it
/// as "auth not set up" and reports no session rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Token endpoint URL for the refresh exchange.
    pub token_endpoint: String,
    /// OAuth client ID registered with the provider.
    pub client_id: String,
    /// OAuth client secret, when the provider requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Scopes requested on refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl ProviderConfig {
    /// Create a configuration with the required fields.
    pub fn new(token_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: None,
            scopes: None,
        }
    }

    /// Set the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the scopes requested on refresh.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Check that the required provider settings are present and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id is required".into()));
        }
        if self.token_endpoint.trim().is_empty() {
            return Err(Error::Config("token_endpoint is required".into()));
        }
        let parsed = url::Url::parse(&self.token_endpoint)
            .map_err(|e| Error::Config(format!("invalid token_endpoint: {}", e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(Error::Config(format!(
                "token_endpoint must be http(s), got '{}'",
                other
            ))),
        }
    }
}
