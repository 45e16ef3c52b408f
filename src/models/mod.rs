//! Data models for the resto-link client library.
//!
//! Defines REST request/response envelopes, entity snapshots, and the
//! push-channel wire messages in both directions.

pub mod api_response;
pub mod auth_models;
pub mod client_message;
pub mod connection_options;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod push_event;
pub mod scope;
pub mod server_message;

pub use api_response::{ApiResponse, Pagination};
pub use auth_models::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RestaurantRef, TenantInfo,
    UserInfo,
};
pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use inventory::{InventoryAlert, InventoryAlertKind};
pub use notification::{NotificationMessage, Severity, UnreadCount};
pub use order::{Order, OrderStatus, OrderType};
pub use push_event::PushEvent;
pub use scope::Scope;
pub use server_message::ServerMessage;
