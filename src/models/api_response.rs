use crate::error::{RestoLinkError, Result};
use serde::{Deserialize, Serialize};

/// The REST envelope every dashboard endpoint responds with.
///
/// `success` is authoritative: a 200 with `success: false` is still a
/// failure, surfaced via [`ApiResponse::into_data`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    // No serde `default` here: it would put a `T: Default` bound on the
    // derived Deserialize impl, and a missing Option field is None anyway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, converting an unsuccessful envelope into a
    /// [`RestoLinkError::ServerError`].
    pub fn into_data(self) -> Result<T> {
        if self.success {
            self.data.ok_or_else(|| {
                RestoLinkError::ServerError {
                    status_code: 200,
                    message: "Response marked successful but carried no data".to_string(),
                }
            })
        } else {
            let message = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Request failed".to_string());
            Err(RestoLinkError::ServerError { status_code: 200, message })
        }
    }
}
