use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload of a successful `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserInfo,
    pub token: String,
    pub refresh_token: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Payload of a successful `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
}

/// The authenticated user as returned by the auth endpoints.
///
/// Only the fields the sync layer needs are modeled; the rest of the user
/// profile rides along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    pub tenant: TenantInfo,
    #[serde(default)]
    pub restaurants: Vec<RestaurantRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// The tenant a user belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInfo {
    pub id: String,
    pub name: String,
}

/// Minimal reference to a restaurant the user can access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantRef {
    pub id: String,
    pub name: String,
}
