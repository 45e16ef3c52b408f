//! Main client: wires the session store, cache, scope tracker, REST client,
//! and the background connection task together behind one handle.

use crate::api::ApiClient;
use crate::cache::QueryCache;
use crate::connection::ConnectionManager;
use crate::error::{RestoLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::fsm::ConnectionState;
use crate::models::{
    ConnectionOptions, LoginResponse, NotificationMessage, Order, OrderStatus, Scope,
};
use crate::reconcile::{Alert, Generation, Reconciler};
use crate::scopes::ScopeTracker;
use crate::session::SessionStore;
use crate::timeouts::RestoLinkTimeouts;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Client for the restaurant dashboard's real-time sync layer.
///
/// Owns one shared push-channel connection and one bounded query cache.
/// All reads go through the cache; push events reconcile it in the
/// background. Create via [`RestoLinkClient::builder`].
///
/// # Example
///
/// ```rust,no_run
/// use resto_link::RestoLinkClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RestoLinkClient::builder()
///     .base_url("https://api.example.com")
///     .build()?;
///
/// client.login("manager@example.com", "secret").await?;
/// let orders = client.orders().await?;
/// println!("{} open orders", orders.len());
/// # Ok(())
/// # }
/// ```
pub struct RestoLinkClient {
    store: SessionStore,
    cache: QueryCache,
    tracker: ScopeTracker,
    api: ApiClient,
    connection: ConnectionManager,
    alerts: Mutex<Option<mpsc::UnboundedReceiver<Alert>>>,
    /// Scopes joined automatically at login, released at logout.
    session_scopes: Mutex<Vec<Scope>>,
}

impl RestoLinkClient {
    /// Create a new builder.
    pub fn builder() -> RestoLinkClientBuilder {
        RestoLinkClientBuilder::new()
    }

    // ── Auth ────────────────────────────────────────────────────────────

    /// Log in, install the session, and join the user's default scopes
    /// (their personal stream plus one per accessible restaurant).
    ///
    /// The background connection dials as soon as the session lands.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let resp = self.api.login(email, password).await?;

        let mut scopes = vec![Scope::user(&resp.user.id)];
        for restaurant in &resp.user.restaurants {
            scopes.push(Scope::restaurant(&restaurant.id));
        }
        for scope in &scopes {
            self.tracker.join(scope.clone());
        }
        *self.session_scopes.lock().expect("scope list lock poisoned") = scopes;

        Ok(resp)
    }

    /// Log out: release the session scopes, clear the session (tearing the
    /// connection down), and invalidate the whole cache view by dropping
    /// user-scoped entries to staleness on next read.
    pub async fn logout(&self) -> Result<()> {
        let scopes = std::mem::take(
            &mut *self.session_scopes.lock().expect("scope list lock poisoned"),
        );
        for scope in &scopes {
            self.tracker.leave(scope);
        }
        self.api.logout().await
    }

    // ── Data access ─────────────────────────────────────────────────────

    /// Fetch the order list (also primes the `orders` cache entry).
    pub async fn orders(&self) -> Result<Vec<Order>> {
        self.api.fetch_orders().await
    }

    /// Fetch the kitchen's active orders (primes `kitchen:orders`).
    pub async fn kitchen_orders(&self) -> Result<Vec<Order>> {
        self.api.fetch_kitchen_orders().await
    }

    /// Change an order's status.
    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        self.api.update_order_status(order_id, status).await
    }

    /// Fetch the notification list (primes `notifications`).
    pub async fn notifications(&self) -> Result<Vec<NotificationMessage>> {
        self.api.fetch_notifications().await
    }

    /// Fetch the unread notification counter.
    pub async fn unread_count(&self) -> Result<u64> {
        self.api.fetch_unread_count().await
    }

    /// Mark a notification read.
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        self.api.mark_notification_read(notification_id).await
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    /// Declare interest in a scope (e.g. the kitchen view joining its
    /// ticket stream). Reference counted; pair with [`leave_scope`].
    ///
    /// [`leave_scope`]: RestoLinkClient::leave_scope
    pub fn join_scope(&self, scope: Scope) {
        self.tracker.join(scope);
    }

    /// Release interest in a scope.
    pub fn leave_scope(&self, scope: &Scope) {
        self.tracker.leave(scope);
    }

    /// The scope tracker backing this client, for inspecting membership.
    pub fn scopes(&self) -> &ScopeTracker {
        &self.tracker
    }

    // ── Observability ───────────────────────────────────────────────────

    /// Take the stream of user-facing alerts derived from push events.
    /// Returns `None` after the first call.
    pub fn alerts(&self) -> Option<mpsc::UnboundedReceiver<Alert>> {
        self.alerts.lock().expect("alert lock poisoned").take()
    }

    /// Whether the push channel is up and authenticated.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current push-channel lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to push-channel state transitions.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// The session store backing this client.
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// The query cache backing this client.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Shut the background connection down. The client remains usable for
    /// REST calls; push updates stop.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }
}

/// Builder for [`RestoLinkClient`].
pub struct RestoLinkClientBuilder {
    base_url: Option<String>,
    timeouts: RestoLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    session_store: Option<SessionStore>,
    cache_capacity: Option<usize>,
}

impl Default for RestoLinkClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoLinkClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            timeouts: RestoLinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::default(),
            session_store: None,
            cache_capacity: None,
        }
    }

    /// Set the API base URL (required), e.g. `https://api.example.com`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the timeout configuration.
    pub fn timeouts(mut self, timeouts: RestoLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the reconnection options.
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Set lifecycle event handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Inject a session store, e.g. one shared with another client or
    /// pre-seeded from persisted credentials. A fresh empty store is used
    /// when omitted.
    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Cap the query cache at `capacity` entries (default 256).
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Build the client and spawn its background connection task.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Result<RestoLinkClient> {
        let base_url = self.base_url.ok_or_else(|| {
            RestoLinkError::ConfigurationError("base_url is required".to_string())
        })?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RestoLinkError::ConfigurationError(format!(
                "base_url must start with http:// or https://: {}",
                base_url
            )));
        }

        let store = self.session_store.unwrap_or_default();
        let cache = match self.cache_capacity {
            Some(capacity) => QueryCache::new(capacity),
            None => QueryCache::default(),
        };
        let api = ApiClient::new(base_url.clone(), store.clone(), cache.clone(), &self.timeouts)?;

        let generation = Generation::default();
        let (reconciler, alert_rx) = Reconciler::new(cache.clone(), generation.clone());
        let (tracker, scope_rx) = ScopeTracker::new();

        let connection = ConnectionManager::spawn(
            base_url,
            store.clone(),
            Arc::new(api.clone()),
            tracker.clone(),
            scope_rx,
            reconciler,
            generation,
            self.timeouts,
            self.connection_options,
            self.event_handlers,
        );

        Ok(RestoLinkClient {
            store,
            cache,
            tracker,
            api,
            connection,
            alerts: Mutex::new(Some(alert_rx)),
            session_scopes: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        match RestoLinkClient::builder().build() {
            Err(RestoLinkError::ConfigurationError(msg)) => {
                assert!(msg.contains("base_url"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_rejects_bad_scheme() {
        let result = RestoLinkClient::builder().base_url("ftp://nope").build();
        assert!(matches!(result, Err(RestoLinkError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_build_wires_shared_state() {
        let store = SessionStore::new();
        let client = RestoLinkClient::builder()
            .base_url("http://localhost:3000")
            .session_store(store.clone())
            .cache_capacity(16)
            .build()
            .unwrap();

        assert!(!client.is_connected());
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.alerts().is_some());
        assert!(client.alerts().is_none(), "alert stream can only be taken once");

        // The injected store is the one the client uses.
        store.set_session(None);
        assert!(client.session_store().session().is_none());
    }
}
