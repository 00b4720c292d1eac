//! The token broker: expiry-aware token reads with coordinated refresh.
//!
//! Holds no token state of its own. The store owns the authoritative pair
//! and every read goes back to it, so concurrent callers converge on
//! whatever refresh outcome landed last.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::inflight::{InflightWaiter, NoopWaiter};
use super::refresher::TokenRefresher;
use crate::config::ProviderConfig;
use crate::error::{RefreshError, Result};
use crate::events::{EventBus, EventSink, SessionEvent};
use crate::models::tokens::{SessionTokens, TokenPair};
use crate::storage::TokenStore;

/// Options for a [`TokenBroker::get_tokens`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetTokensOptions {
    /// Refresh even when the cached pair is still fresh.
    pub force_refresh: bool,
}

/// Orchestrates the credential lifecycle over injected collaborators.
///
/// A missing or invalid provider configuration is treated as "auth not set
/// up": [`TokenBroker::get_tokens`] reports no session without touching the
/// store or the refresher.
pub struct TokenBroker {
    /// Provider configuration slot, read on every call.
    config: RwLock<Option<ProviderConfig>>,
    /// Owns the authoritative token pair.
    store: Arc<dyn TokenStore>,
    /// Performs the refresh exchange.
    refresher: Arc<dyn TokenRefresher>,
    /// Gates reads on unrelated inflight exchanges.
    waiter: Arc<dyn InflightWaiter>,
    /// Receives lifecycle events.
    events: Arc<dyn EventSink>,
}

impl TokenBroker {
    /// Create a broker over a store and a refresher.
    ///
    /// The waiter defaults to [`NoopWaiter`] and events go to a fresh
    /// [`EventBus`] nobody subscribes to; use the `with_*` methods to wire
    /// real collaborators.
    pub fn new(store: Arc<dyn TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            config: RwLock::new(None),
            store,
            refresher,
            waiter: Arc::new(NoopWaiter),
            events: Arc::new(EventBus::new()),
        }
    }

    /// Set the provider configuration at construction.
    #[must_use]
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = RwLock::new(Some(config));
        self
    }

    /// Set the inflight-exchange waiter.
    #[must_use]
    pub fn with_waiter(mut self, waiter: Arc<dyn InflightWaiter>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Set the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the provider configuration.
    pub async fn set_config(&self, config: ProviderConfig) {
        *self.config.write().await = Some(config);
    }

    /// Get the current session tokens, refreshing when stale.
    ///
    /// Returns `Ok(None)` when no usable session exists: provider not
    /// configured, nothing in the store, or the provider rejected the
    /// refresh credential. Network and provider faults during refresh
    /// surface as errors so callers can apply their own retry policy.
    pub async fn get_tokens(&self, options: GetTokensOptions) -> Result<Option<SessionTokens>> {
        let config = {
            let slot = self.config.read().await;
            match slot.as_ref() {
                Some(config) if config.validate().is_ok() => config.clone(),
                _ => {
                    debug!("identity provider not configured, no session");
                    return Ok(None);
                }
            }
        };

        // An interactive exchange may be about to replace the store.
        self.waiter.wait().await;

        let Some(mut tokens) = self.store.load().await? else {
            return Ok(None);
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let id_token_expired = tokens.id_token_expired_at(now_ms);
        let access_token_expired = tokens.access_token_expired_at(now_ms);

        if options.force_refresh || id_token_expired || access_token_expired {
            debug!(
                force_refresh = options.force_refresh,
                id_token_expired, access_token_expired, "Refreshing token pair"
            );
            match self.refresh_tokens(tokens, &config).await? {
                Some(fresh) => tokens = fresh,
                None => return Ok(None),
            }
        }

        Ok(Some(SessionTokens {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
        }))
    }

    /// Run the refresh exchange and apply its outcome.
    ///
    /// The only path that writes a new pair to the store.
    async fn refresh_tokens(
        &self,
        current: TokenPair,
        config: &ProviderConfig,
    ) -> Result<Option<TokenPair>> {
        match self.refresher.refresh(&current, config).await {
            Ok(fresh) => {
                self.store.store(&fresh).await?;
                info!("Token pair refreshed");
                self.events.publish(SessionEvent::TokenRefreshed);
                Ok(Some(fresh))
            }
            Err(err) => self.handle_refresh_failure(err).await,
        }
    }

    /// Classify a refresh failure and settle the store accordingly.
    async fn handle_refresh_failure(&self, err: RefreshError) -> Result<Option<TokenPair>> {
        // A network fault may be transient; the cached pair could still be
        // valid once connectivity returns. Anything else invalidates it.
        if !err.is_network() {
            self.store.clear().await?;
        }

        if err.is_unauthorized() {
            // The provider ended the session. Expected path, reported as
            // no-session rather than a fault.
            debug!("Refresh credential rejected, session ended");
            return Ok(None);
        }

        self.events.publish(SessionEvent::TokenRefreshFailed {
            error: err.to_string(),
        });
        Err(err.into())
    }
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::inflight::ExchangeGate;
    use crate::error::Error;
    use crate::models::tokens::{BearerToken, TokenClaims};
    use crate::storage::MemoryTokenStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn token_with_exp(raw: &str, exp: i64) -> BearerToken {
        BearerToken::with_claims(
            raw,
            TokenClaims {
                exp,
                ..TokenClaims::default()
            },
        )
    }

    fn fresh_pair() -> TokenPair {
        let exp = chrono::Utc::now().timestamp() + 3600;
        TokenPair::new(token_with_exp("access-fresh", exp))
            .with_id_token(token_with_exp("id-fresh", exp))
            .with_refresh_token("refresh-1")
    }

    fn expired_pair() -> TokenPair {
        let exp = chrono::Utc::now().timestamp() - 60;
        TokenPair::new(token_with_exp("access-stale", exp)).with_refresh_token("refresh-1")
    }

    fn refreshed_pair() -> TokenPair {
        let exp = chrono::Utc::now().timestamp() + 7200;
        TokenPair::new(token_with_exp("access-new", exp))
            .with_id_token(token_with_exp("id-new", exp))
            .with_refresh_token("refresh-2")
    }

    fn config() -> ProviderConfig {
        ProviderConfig::new("https://auth.example.com/oauth2/token", "client-abc")
    }

    /// Store double counting every operation.
    struct CountingStore {
        inner: MemoryTokenStore,
        loads: AtomicUsize,
        stores: AtomicUsize,
        clears: AtomicUsize,
    }

    impl CountingStore {
        fn empty() -> Self {
            Self {
                inner: MemoryTokenStore::new(),
                loads: AtomicUsize::new(0),
                stores: AtomicUsize::new(0),
                clears: AtomicUsize::new(0),
            }
        }

        fn seeded(pair: TokenPair) -> Self {
            Self {
                inner: MemoryTokenStore::with_tokens(pair),
                ..Self::empty()
            }
        }
    }

    #[async_trait]
    impl TokenStore for CountingStore {
        async fn load(&self) -> Result<Option<TokenPair>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load().await
        }
        async fn store(&self, tokens: &TokenPair) -> Result<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.store(tokens).await
        }
        async fn clear(&self) -> Result<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.inner.clear().await
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    type RefreshOutcome = Box<dyn Fn() -> std::result::Result<TokenPair, RefreshError> + Send + Sync>;

    /// Refresher double with a scripted outcome.
    struct ScriptedRefresher {
        outcome: RefreshOutcome,
        calls: AtomicUsize,
    }

    impl ScriptedRefresher {
        fn succeeding(pair: TokenPair) -> Self {
            Self {
                outcome: Box::new(move || Ok(pair.clone())),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(make_err: impl Fn() -> RefreshError + Send + Sync + 'static) -> Self {
            Self {
                outcome: Box::new(move || Err(make_err())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for ScriptedRefresher {
        async fn refresh(
            &self,
            _current: &TokenPair,
            _config: &ProviderConfig,
        ) -> std::result::Result<TokenPair, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    /// Event sink double recording every publication.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingSink {
        fn recorded(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        broker: TokenBroker,
        store: Arc<CountingStore>,
        refresher: Arc<ScriptedRefresher>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(store: CountingStore, refresher: ScriptedRefresher, configured: bool) -> Fixture {
        let store = Arc::new(store);
        let refresher = Arc::new(refresher);
        let sink = Arc::new(RecordingSink::default());
        let mut broker = TokenBroker::new(store.clone(), refresher.clone())
            .with_events(sink.clone() as Arc<dyn EventSink>);
        if configured {
            broker = broker.with_config(config());
        }
        Fixture {
            broker,
            store,
            refresher,
            sink,
        }
    }

    #[tokio::test]
    async fn test_missing_config_short_circuits() {
        let f = fixture(
            CountingStore::seeded(fresh_pair()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            false,
        );

        let result = f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 0);
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_short_circuits() {
        let f = fixture(
            CountingStore::seeded(fresh_pair()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            false,
        );
        f.broker
            .set_config(ProviderConfig::new("https://auth.example.com/token", ""))
            .await;

        let result = f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 0);
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_store_is_no_session() {
        let f = fixture(
            CountingStore::empty(),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        let result = f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 1);
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_tokens_returned_unchanged() {
        let pair = fresh_pair();
        let f = fixture(
            CountingStore::seeded(pair.clone()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        let tokens = f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap()
            .expect("session exists");

        assert_eq!(tokens.access_token, pair.access_token);
        assert_eq!(tokens.id_token, pair.id_token);
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.stores.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.clears.load(Ordering::SeqCst), 0);
        assert!(f.sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_expired_access_token_triggers_one_refresh() {
        let new_pair = refreshed_pair();
        let f = fixture(
            CountingStore::seeded(expired_pair()),
            ScriptedRefresher::succeeding(new_pair.clone()),
            true,
        );

        let tokens = f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap()
            .expect("refresh yields a session");

        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tokens.access_token, new_pair.access_token);
        // full replacement persisted
        assert_eq!(f.store.stores.load(Ordering::SeqCst), 1);
        let stored = f.store.load().await.unwrap().unwrap();
        assert_eq!(stored, new_pair);
        assert_eq!(f.sink.recorded(), vec![SessionEvent::TokenRefreshed]);
    }

    #[tokio::test]
    async fn test_expired_id_token_triggers_refresh() {
        let now = chrono::Utc::now().timestamp();
        let pair = TokenPair::new(token_with_exp("access-fresh", now + 3600))
            .with_id_token(token_with_exp("id-stale", now - 30))
            .with_refresh_token("refresh-1");
        let f = fixture(
            CountingStore::seeded(pair),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clock_drift_defers_refresh() {
        // raw expiry in the past, but a large positive drift keeps it valid
        let now = chrono::Utc::now().timestamp();
        let pair = TokenPair::new(token_with_exp("access", now - 10))
            .with_refresh_token("refresh-1")
            .with_clock_drift(15_000);
        let f = fixture(
            CountingStore::seeded(pair),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        let tokens = f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert!(tokens.is_some());
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_clock_drift_forces_refresh() {
        // raw expiry in the future, but a negative drift makes it stale
        let now = chrono::Utc::now().timestamp();
        let pair = TokenPair::new(token_with_exp("access", now + 10))
            .with_refresh_token("refresh-1")
            .with_clock_drift(-20_000);
        let f = fixture(
            CountingStore::seeded(pair),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_overrides_freshness() {
        let f = fixture(
            CountingStore::seeded(fresh_pair()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        let tokens = f
            .broker
            .get_tokens(GetTokensOptions {
                force_refresh: true,
            })
            .await
            .unwrap()
            .expect("session exists");

        assert_eq!(f.refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tokens.access_token.raw, "access-new");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_store_and_silences() {
        let f = fixture(
            CountingStore::seeded(expired_pair()),
            ScriptedRefresher::failing(|| RefreshError::Unauthorized("invalid_grant".into())),
            true,
        );

        let result = f.broker.get_tokens(GetTokensOptions::default()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.clears.load(Ordering::SeqCst), 1);
        assert!(f.store.load().await.unwrap().is_none());
        assert!(f.sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_preserves_store_and_surfaces() {
        let pair = expired_pair();
        let f = fixture(
            CountingStore::seeded(pair.clone()),
            ScriptedRefresher::failing(|| RefreshError::Network("connection refused".into())),
            true,
        );

        let err = f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Refresh(RefreshError::Network(_))));

        // cache intact
        assert_eq!(f.store.clears.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.load().await.unwrap().unwrap(), pair);
        // failure announced
        assert!(matches!(
            f.sink.recorded().as_slice(),
            [SessionEvent::TokenRefreshFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_provider_fault_clears_store_and_surfaces() {
        let f = fixture(
            CountingStore::seeded(expired_pair()),
            ScriptedRefresher::failing(|| RefreshError::Provider("500 internal".into())),
            true,
        );

        let err = f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Refresh(RefreshError::Provider(_))));
        assert_eq!(f.store.clears.load(Ordering::SeqCst), 1);
        assert!(f.store.load().await.unwrap().is_none());
        assert!(matches!(
            f.sink.recorded().as_slice(),
            [SessionEvent::TokenRefreshFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_returned_shape_never_leaks_refresh_credential() {
        let pair = fresh_pair();
        let f = fixture(
            CountingStore::seeded(pair.clone()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            true,
        );

        let tokens = f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap()
            .unwrap();

        // SessionTokens carries access and id tokens only; the stored pair
        // still holds the refresh credential.
        assert_eq!(tokens.access_token, pair.access_token);
        assert_eq!(tokens.id_token, pair.id_token);
        let stored = f.store.load().await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_reads_wait_for_inflight_exchange() {
        let gate = ExchangeGate::new();
        let guard = gate.begin();

        let store = Arc::new(CountingStore::seeded(fresh_pair()));
        let refresher = Arc::new(ScriptedRefresher::succeeding(refreshed_pair()));
        let broker = Arc::new(
            TokenBroker::new(store.clone(), refresher)
                .with_config(config())
                .with_waiter(Arc::new(gate.clone())),
        );

        let pending = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.get_tokens(GetTokensOptions::default()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        // still gated: the store has not been read
        assert_eq!(store.loads.load(Ordering::SeqCst), 0);

        drop(guard);
        let result = timeout(Duration::from_millis(100), pending)
            .await
            .expect("gated read must resolve")
            .unwrap()
            .unwrap();
        assert!(result.is_some());
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_config_enables_later_calls() {
        let f = fixture(
            CountingStore::seeded(fresh_pair()),
            ScriptedRefresher::succeeding(refreshed_pair()),
            false,
        );

        assert!(f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap()
            .is_none());

        f.broker.set_config(config()).await;
        assert!(f
            .broker
            .get_tokens(GetTokensOptions::default())
            .await
            .unwrap()
            .is_some());
    }
}
