//! # resto-link
//!
//! Real-time state synchronization client for the restaurant management
//! platform. Keeps a dashboard's local view of orders, kitchen tickets,
//! notifications, and inventory consistent with the server over one shared
//! WebSocket push channel plus authenticated REST fetches.
//!
//! ## Architecture
//!
//! - [`SessionStore`]: the authenticated identity, published on a watch
//!   channel. Valid session in, connection up; session cleared, connection
//!   down.
//! - [`ConnectionManager`]: background task owning the WebSocket. Automatic
//!   reconnection with exponential backoff, re-joining tracked scopes after
//!   every reconnect.
//! - [`ScopeTracker`]: reference-counted room membership, shared by all
//!   views so the same scope is joined on the wire exactly once.
//! - [`Reconciler`]: maps push events onto cache writes and invalidations,
//!   discarding events from torn-down connections.
//! - [`QueryCache`]: bounded, subscribable store of query results; the
//!   single source of truth for rendering.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use resto_link::{RestoLinkClient, Scope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RestoLinkClient::builder()
//!     .base_url("https://api.example.com")
//!     .build()?;
//!
//! client.login("manager@example.com", "secret").await?;
//!
//! // Pull current state; pushes keep it fresh from here on.
//! let orders = client.orders().await?;
//! println!("{} open orders", orders.len());
//!
//! // The kitchen view additionally follows its ticket stream.
//! client.join_scope(Scope::kitchen("r42"));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod error;
pub mod event_handlers;
pub mod fsm;
pub mod models;
pub mod reconcile;
pub mod scopes;
pub mod session;
pub mod timeouts;

pub(crate) mod connection;

pub use api::ApiClient;
pub use cache::{CacheSubscription, CacheUpdate, QueryCache, QueryKey};
pub use client::{RestoLinkClient, RestoLinkClientBuilder};
pub use error::{RestoLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use fsm::{ConnectionState, ReconnectPolicy};
pub use models::{
    ApiResponse, ConnectionOptions, InventoryAlert, InventoryAlertKind, LoginResponse,
    NotificationMessage, Order, OrderStatus, OrderType, Pagination, PushEvent, Scope, Severity,
    UnreadCount, UserInfo,
};
pub use reconcile::{Alert, Generation, Reconciler};
pub use scopes::ScopeTracker;
pub use session::{Session, SessionBackend, SessionSnapshot, SessionStore};
pub use timeouts::{RestoLinkTimeouts, RestoLinkTimeoutsBuilder};
