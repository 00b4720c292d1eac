//! HTTP refresh exchange using the OAuth `refresh_token` grant.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::refresher::TokenRefresher;
use crate::config::{ProviderConfig, CONNECT_TIMEOUT};
use crate::error::RefreshError;
use crate::models::tokens::{BearerToken, TokenClaims, TokenPair};

/// Token refresher that POSTs a `refresh_token` grant to the provider's
/// token endpoint.
///
/// Transport failures classify as [`RefreshError::Network`]; `invalid_grant`
/// rejections and 401/403 responses classify as
/// [`RefreshError::Unauthorized`]; everything else is
/// [`RefreshError::Provider`].
pub struct HttpTokenRefresher {
    client: reqwest::Client,
}

impl HttpTokenRefresher {
    /// Create a refresher with a default HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Use a caller-supplied HTTP client (custom TLS, proxies, timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Token lifetime in seconds, for providers whose access tokens carry no
    /// decodable `exp` claim.
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error response from the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(
        &self,
        current: &TokenPair,
        config: &ProviderConfig,
    ) -> Result<TokenPair, RefreshError> {
        // Without a refresh credential the session cannot be renewed; report
        // it as the provider ending the session.
        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::Unauthorized("no refresh credential".into()))?;

        info!("Refreshing tokens via {}", config.token_endpoint);

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", config.client_id.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(secret) = &config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        if let Some(scopes) = &config.scopes {
            form.push(("scope", scopes.join(" ")));
        }

        let response = self
            .client
            .post(&config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), &body));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Provider(format!("unreadable token response: {}", e)))?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let pair = assemble_pair(current, data, now_ms)?;
        debug!("Token pair refreshed");
        Ok(pair)
    }
}

/// Map a non-2xx token-endpoint response onto the typed error set.
fn classify_rejection(status: u16, body: &str) -> RefreshError {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
        let detail = match &err.error_description {
            Some(desc) => format!("{}: {}", err.error, desc),
            None => err.error.clone(),
        };
        // invalid_grant means the refresh token itself was rejected
        if err.error == "invalid_grant" {
            return RefreshError::Unauthorized(detail);
        }
        if status == 401 || status == 403 {
            return RefreshError::Unauthorized(detail);
        }
        return RefreshError::Provider(format!("token endpoint returned {}: {}", status, detail));
    }
    if status == 401 || status == 403 {
        return RefreshError::Unauthorized(format!("token endpoint returned {}", status));
    }
    RefreshError::Provider(format!("token endpoint returned {}: {}", status, body))
}

/// Build the replacement pair from a successful response.
///
/// Claims come from the token payloads when decodable; otherwise expiry is
/// synthesized from `expires_in`. Drift is recomputed from the fresh access
/// token's `iat` claim when present, else carried forward unchanged. The
/// refresh credential falls back to the previous one when the provider
/// rotates nothing.
fn assemble_pair(
    current: &TokenPair,
    data: TokenResponse,
    now_ms: i64,
) -> Result<TokenPair, RefreshError> {
    if data.access_token.is_empty() {
        return Err(RefreshError::Provider(
            "response does not contain an access token".into(),
        ));
    }

    let access_token = match BearerToken::parse(&data.access_token) {
        Ok(token) if token.claims.exp > 0 => token,
        _ => {
            let expires_in = data.expires_in.unwrap_or(3600);
            BearerToken::with_claims(
                &data.access_token,
                TokenClaims {
                    exp: now_ms / 1000 + expires_in,
                    ..TokenClaims::default()
                },
            )
        }
    };

    let id_token = match &data.id_token {
        Some(raw) => Some(
            BearerToken::parse(raw)
                .map_err(|e| RefreshError::Provider(format!("unreadable identity token: {}", e)))?,
        ),
        None => None,
    };

    let clock_drift_ms = match access_token.claims.iat {
        Some(iat) => iat * 1000 - now_ms,
        None => current.clock_drift_ms,
    };

    let refresh_token = data
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| current.refresh_token.clone());

    Ok(TokenPair {
        id_token,
        access_token,
        refresh_token,
        clock_drift_ms,
    })
}
