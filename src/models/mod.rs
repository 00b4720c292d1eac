//! Data model for token pairs and their claims.

pub mod tokens;

pub use tokens::{BearerToken, SessionTokens, TokenClaims, TokenPair};
