//! Bearer tokens, the persisted token pair, and expiry evaluation.
//!
//! Expiry is always evaluated against an *adjusted* timestamp:
//! `exp * 1000 + clock_drift_ms`, compared to wall-clock milliseconds. The
//! drift offset compensates for skew between the local clock and the
//! issuer's clock.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Claims the broker reads from a token payload.
///
/// Unknown claims are ignored on decode. A payload without an `exp` claim
/// decodes to `exp = 0`, which evaluates as already expired.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiration time, seconds since epoch.
    #[serde(default)]
    pub exp: i64,
    /// Issued-at time, seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Provider-assigned username, when the provider issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// An opaque signed bearer token together with its decoded payload claims.
///
/// The broker never validates the signature; decoding only reads the payload
/// segment so expiry can be evaluated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BearerToken {
    /// The compact serialization, sent as-is in `Authorization` headers.
    pub raw: String,
    /// Decoded payload claims.
    pub claims: TokenClaims,
}

impl BearerToken {
    /// Decode a compact JWT serialization into a token with claims.
    ///
    /// Splits on `.`, base64url-decodes the payload segment, and reads the
    /// claims. The signature segment is not inspected.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let claims = decode_payload(&raw)?;
        Ok(Self { raw, claims })
    }

    /// Construct a token from a raw value and already-known claims.
    ///
    /// Used by refreshers whose provider reports expiry out-of-band instead
    /// of (or in addition to) the `exp` claim.
    pub fn with_claims(raw: impl Into<String>, claims: TokenClaims) -> Self {
        Self {
            raw: raw.into(),
            claims,
        }
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn decode_payload(raw: &str) -> Result<TokenClaims> {
    let payload = raw
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::MalformedToken("missing payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {}", e)))
}

/// The unit the store persists and the refresher returns.
///
/// A stored pair is either fully absent (no session) or carries an access
/// token that was valid at store time; partial pairs are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    /// Identity token. Absent for tokens-only configurations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<BearerToken>,
    /// Access token. Always present in a valid pair.
    pub access_token: BearerToken,
    /// Refresh credential, consumed only by the refresher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Offset in milliseconds applied when evaluating expiry.
    #[serde(default)]
    pub clock_drift_ms: i64,
}

impl TokenPair {
    /// Create a pair holding only an access token.
    pub fn new(access_token: BearerToken) -> Self {
        Self {
            id_token: None,
            access_token,
            refresh_token: None,
            clock_drift_ms: 0,
        }
    }

    /// Set the identity token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: BearerToken) -> Self {
        self.id_token = Some(id_token);
        self
    }

    /// Set the refresh credential.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the clock-drift offset.
    #[must_use]
    pub fn with_clock_drift(mut self, clock_drift_ms: i64) -> Self {
        self.clock_drift_ms = clock_drift_ms;
        self
    }

    /// True when an identity token is present and its adjusted expiry has
    /// passed at `now_ms`.
    #[must_use]
    pub fn id_token_expired_at(&self, now_ms: i64) -> bool {
        self.id_token
            .as_ref()
            .is_some_and(|t| adjusted_expiry_ms(&t.claims, self.clock_drift_ms) <= now_ms)
    }

    /// True when the access token's adjusted expiry has passed at `now_ms`.
    #[must_use]
    pub fn access_token_expired_at(&self, now_ms: i64) -> bool {
        adjusted_expiry_ms(&self.access_token.claims, self.clock_drift_ms) <= now_ms
    }

    /// True when either token in the pair has expired at `now_ms`.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.id_token_expired_at(now_ms) || self.access_token_expired_at(now_ms)
    }

    /// True when either token in the pair has expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis())
    }

    /// Duration until the access token's adjusted expiry.
    ///
    /// Returns `Duration::ZERO` if the access token has already expired.
    pub fn time_until_expiry(&self) -> Duration {
        let now = chrono::Utc::now().timestamp_millis();
        let remaining = adjusted_expiry_ms(&self.access_token.claims, self.clock_drift_ms) - now;
        if remaining > 0 {
            Duration::from_millis(remaining as u64)
        } else {
            Duration::ZERO
        }
    }
}

fn adjusted_expiry_ms(claims: &TokenClaims, clock_drift_ms: i64) -> i64 {
    claims.exp.saturating_mul(1000).saturating_add(clock_drift_ms)
}

/// The token view handed back to callers of the broker.
///
/// Carries the access and identity tokens only; the refresh credential and
/// the drift offset stay inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// Access token.
    pub access_token: BearerToken,
    /// Identity token, when the configuration issues one.
    pub id_token: Option<BearerToken>,
}
