// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::{CacheError, ConnectionError};
use crate::middleware::ResolveError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 404 Not Found
    TenantNotFound(String),

    // 500 Internal Server Error
    TenantUnavailable(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
    DirectoryUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::TenantNotFound(_) => 404,
            ApiError::TenantUnavailable(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::DirectoryUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::TenantNotFound(msg) => msg,
            ApiError::TenantUnavailable(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::DirectoryUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ApiError::TenantUnavailable(_) => "TENANT_UNAVAILABLE",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

impl ApiError {
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn tenant_not_found(identifier: &str) -> Self {
        ApiError::TenantNotFound(format!("Tenant '{}' does not exist", identifier))
    }

    pub fn tenant_unavailable(identifier: &str) -> Self {
        ApiError::TenantUnavailable(format!("Tenant '{}' database is unavailable", identifier))
    }

    pub fn directory_unavailable() -> Self {
        ApiError::DirectoryUnavailable("Tenant directory temporarily unavailable".to_string())
    }
}

// Convert other error types to ApiError
impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::TenantNotFound(identifier) => ApiError::tenant_not_found(&identifier),
            ResolveError::TenantUnavailable { identifier, source } => {
                // Credentials and hostnames stay in the log, not the response
                tracing::error!("Tenant '{}' connection failed: {}", identifier, source);
                ApiError::tenant_unavailable(&identifier)
            }
            ResolveError::DirectoryUnavailable(msg) => {
                tracing::error!("Tenant directory unavailable: {}", msg);
                ApiError::directory_unavailable()
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ResolveError::from(err).into()
    }
}

impl From<ConnectionError> for ApiError {
    fn from(err: ConnectionError) -> Self {
        tracing::error!("Database connection error: {}", err);
        ApiError::service_unavailable("Database temporarily unavailable")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_map_to_stable_codes() {
        let not_found: ApiError = ResolveError::TenantNotFound("acme".to_string()).into();
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(not_found.error_code(), "TENANT_NOT_FOUND");

        let unavailable: ApiError = ResolveError::TenantUnavailable {
            identifier: "acme".to_string(),
            source: ConnectionError::Rejected("password authentication failed".to_string()),
        }
        .into();
        assert_eq!(unavailable.status_code(), 500);
        assert_eq!(unavailable.error_code(), "TENANT_UNAVAILABLE");
        assert!(!unavailable.message().contains("password"));

        let directory: ApiError = ResolveError::DirectoryUnavailable("refused".to_string()).into();
        assert_eq!(directory.status_code(), 503);
        assert_eq!(directory.error_code(), "DIRECTORY_UNAVAILABLE");
    }

    #[test]
    fn json_body_shape() {
        let body = ApiError::tenant_not_found("acme").to_json();
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "TENANT_NOT_FOUND");
        assert_eq!(body["message"], "Tenant 'acme' does not exist");
    }
}
