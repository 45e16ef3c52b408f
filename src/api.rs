//! REST boundary: authenticated fetches that prime the query cache.
//!
//! All endpoints speak the dashboard's `{ success, data, ... }` envelope.
//! Reads are retried a couple of times on transport-level failures;
//! mutations are not retried (the server may have applied them).
//!
//! Fetches are tagged with the session identity they started under. A fetch
//! that completes after a logout or user switch is discarded instead of
//! written to the cache, so a slow response can never leak one user's data
//! into another user's view.

use crate::cache::QueryCache;
use crate::error::{RestoLinkError, Result};
use crate::models::{
    ApiResponse, LoginRequest, LoginResponse, NotificationMessage, Order, OrderStatus,
    RefreshRequest, RefreshResponse, UnreadCount,
};
use crate::session::{Session, SessionBackend, SessionStore};
use crate::timeouts::RestoLinkTimeouts;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Retries for idempotent reads on transport failures.
const GET_RETRY_BUDGET: u32 = 2;

/// HTTP client for the dashboard REST API.
///
/// Cloning is cheap; clones share the connection pool, the session store,
/// and the cache.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: SessionStore,
    cache: QueryCache,
}

impl ApiClient {
    pub(crate) fn new(
        base_url: String,
        store: SessionStore,
        cache: QueryCache,
        timeouts: &RestoLinkTimeouts,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connection_timeout)
            .timeout(timeouts.receive_timeout)
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), store, cache })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Execute a request, unwrap the envelope.
    ///
    /// A 401 clears the session: the token is no longer honored and every
    /// subsequent call would fail the same way.
    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let request = match self.store.session() {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 401 {
            log::warn!("[API] 401 response; clearing session");
            self.store.clear();
            return Err(RestoLinkError::AuthenticationError(
                "Session rejected by server".to_string(),
            ));
        }

        let body = response.text().await?;
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => envelope.into_data().map_err(|e| match e {
                RestoLinkError::ServerError { message, .. } => RestoLinkError::ServerError {
                    status_code: status.as_u16(),
                    message,
                },
                other => other,
            }),
            Err(_) => Err(RestoLinkError::ServerError {
                status_code: status.as_u16(),
                message: if body.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    body.chars().take(200).collect()
                },
            }),
        }
    }

    /// GET with a small retry budget for transport-level failures.
    async fn get_with_retry<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.execute(self.http.get(self.url(path))).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < GET_RETRY_BUDGET && e.is_retriable() => {
                    attempt += 1;
                    log::debug!("[API] GET {} retry {} after: {}", path, attempt, e);
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.execute(self.http.patch(self.url(path)).json(body)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.execute(self.http.post(self.url(path)).json(body)).await
    }

    /// Fail if the session identity moved on while a request was in flight.
    fn guard_identity(&self, started_under: u64) -> Result<()> {
        if self.store.identity() == started_under {
            Ok(())
        } else {
            Err(RestoLinkError::SessionError(
                "Session changed while the request was in flight".to_string(),
            ))
        }
    }

    // ── Auth ────────────────────────────────────────────────────────────

    /// Log in and install the resulting session in the store.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest { email: email.to_string(), password: password.to_string() };
        let resp: LoginResponse = self.post("/auth/login", &body).await?;
        let session = Session {
            user_id: resp.user.id.clone(),
            tenant_id: resp.user.tenant.id.clone(),
            token: resp.token.clone(),
            refresh_token: Some(resp.refresh_token.clone()),
            token_expiry_ms: None,
            restaurant_ids: resp.user.restaurants.iter().map(|r| r.id.clone()).collect(),
        };
        self.store.set_session(Some(session));
        Ok(resp)
    }

    /// Log out: best-effort server-side invalidation, then local clear.
    pub async fn logout(&self) -> Result<()> {
        let result: Result<serde_json::Value> = self.post("/auth/logout", &json!({})).await;
        if let Err(e) = result {
            log::debug!("[API] logout request failed (session cleared anyway): {}", e);
        }
        self.store.clear();
        Ok(())
    }

    // ── Orders ──────────────────────────────────────────────────────────

    /// Fetch the order list and prime the `orders` cache entry.
    pub async fn fetch_orders(&self) -> Result<Vec<Order>> {
        let identity = self.store.identity();
        let orders: Vec<Order> = self.get_with_retry("/orders").await?;
        self.guard_identity(identity)?;
        self.cache.set("orders", serde_json::to_value(&orders)?);
        Ok(orders)
    }

    /// Fetch the kitchen's active orders and prime `kitchen:orders`.
    pub async fn fetch_kitchen_orders(&self) -> Result<Vec<Order>> {
        let identity = self.store.identity();
        let orders: Vec<Order> = self.get_with_retry("/kitchen/orders").await?;
        self.guard_identity(identity)?;
        self.cache.set("kitchen:orders", serde_json::to_value(&orders)?);
        Ok(orders)
    }

    /// Change an order's status. The server answers with the full updated
    /// order, which replaces the cached snapshot immediately; the matching
    /// push event then reaches every other connected dashboard.
    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        let identity = self.store.identity();
        let order: Order = self
            .patch(&format!("/orders/{}/status", order_id), &json!({ "status": status }))
            .await?;
        self.guard_identity(identity)?;
        self.cache.upsert_entity("order", &order.id, serde_json::to_value(&order)?);
        self.cache.invalidate_scope("orders");
        self.cache.invalidate_scope("kitchen");
        Ok(order)
    }

    // ── Notifications ───────────────────────────────────────────────────

    /// Fetch the notification list and prime `notifications`.
    pub async fn fetch_notifications(&self) -> Result<Vec<NotificationMessage>> {
        let identity = self.store.identity();
        let notifications: Vec<NotificationMessage> =
            self.get_with_retry("/notifications").await?;
        self.guard_identity(identity)?;
        self.cache.set("notifications", serde_json::to_value(&notifications)?);
        Ok(notifications)
    }

    /// Fetch the unread counter and prime `notifications:unread-count`.
    pub async fn fetch_unread_count(&self) -> Result<u64> {
        let identity = self.store.identity();
        let unread: UnreadCount = self.get_with_retry("/notifications/unread-count").await?;
        self.guard_identity(identity)?;
        self.cache.set("notifications:unread-count", serde_json::to_value(&unread)?);
        Ok(unread.count)
    }

    /// Mark one notification read and reconcile the cached list and counter.
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let identity = self.store.identity();
        let _: serde_json::Value = self
            .patch(&format!("/notifications/{}/read", notification_id), &json!({}))
            .await?;
        self.guard_identity(identity)?;
        let id = notification_id.to_string();
        self.cache.update("notifications", |current| {
            let items = current?.as_array()?.clone();
            let items: Vec<_> = items
                .into_iter()
                .map(|mut n| {
                    if n.get("id").and_then(|v| v.as_str()) == Some(id.as_str()) {
                        n["read"] = json!(true);
                    }
                    n
                })
                .collect();
            Some(serde_json::Value::Array(items))
        });
        self.cache.update("notifications:unread-count", |current| {
            let count = current?.get("count")?.as_u64()?;
            Some(json!({ "count": count.saturating_sub(1) }))
        });
        Ok(())
    }
}

/// The HTTP-backed refresh path used when the push-channel handshake is
/// rejected with an expired token.
#[async_trait::async_trait]
impl SessionBackend for ApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let body = RefreshRequest { refresh_token: refresh_token.to_string() };
        // Deliberately unauthenticated: the access token being refreshed is
        // presumed dead.
        let response = self.http.post(self.url("/auth/refresh")).json(&body).send().await?;
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ApiResponse<RefreshResponse>>(&body) {
            Ok(envelope) => envelope.into_data(),
            Err(_) => Err(RestoLinkError::ServerError {
                status_code: status.as_u16(),
                message: format!("Refresh failed with HTTP {}", status.as_u16()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(
            "http://localhost:3000/".to_string(),
            SessionStore::new(),
            QueryCache::default(),
            &RestoLinkTimeouts::fast(),
        )
        .unwrap()
    }

    #[test]
    fn test_url_joining_strips_trailing_slash() {
        let c = client();
        assert_eq!(c.url("/orders"), "http://localhost:3000/orders");
    }

    #[tokio::test]
    async fn test_identity_guard_discards_superseded_fetch() {
        let c = client();
        let started = c.store.identity();
        c.store.set_session(Some(Session {
            user_id: "u2".into(),
            tenant_id: "t1".into(),
            token: "tok".into(),
            refresh_token: None,
            token_expiry_ms: None,
            restaurant_ids: vec![],
        }));
        assert!(c.guard_identity(started).is_err());
        assert!(c.guard_identity(c.store.identity()).is_ok());
    }
}
