//! The token broker and its collaborator contracts.

mod http;
mod inflight;
mod orchestrator;
mod refresher;

pub use http::HttpTokenRefresher;
pub use inflight::{ExchangeGate, ExchangeGuard, InflightWaiter, NoopWaiter};
pub use orchestrator::{GetTokensOptions, TokenBroker};
pub use refresher::TokenRefresher;
