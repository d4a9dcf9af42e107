// API error body shared by every endpoint.
//
// Shape: {name, message, action, status_code, error_id, request_id}

use crate::core::firewall::FirewallError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub name: &'static str,
    pub message: String,
    pub action: String,
    pub status_code: u16,
    pub error_id: Uuid,
    pub request_id: Uuid,
}

impl ApiError {
    fn new(status: StatusCode, name: &'static str, message: String, action: &str) -> Self {
        Self {
            status,
            name,
            message,
            action: action.to_string(),
            status_code: status.as_u16(),
            error_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UnauthorizedError",
            "No authenticated user in the request.".to_string(),
            "Send the x-user-id header of an existing user.",
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            message.into(),
            "Fix the request and try again.",
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NotFoundError",
            message.into(),
            "Check that the id is correct.",
        )
    }
}

impl From<FirewallError> for ApiError {
    fn from(err: FirewallError) -> Self {
        match err {
            FirewallError::RateLimitExceeded { rule, event_id } => {
                tracing::info!(rule = %rule, event_id = %event_id, "Request rejected by firewall");
                Self::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    "TooManyRequestsError",
                    "You are doing that too often.".to_string(),
                    "Wait a few minutes before trying again.",
                )
            }
            FirewallError::Forbidden(message) => Self::new(
                StatusCode::FORBIDDEN,
                "ForbiddenError",
                format!("You are not allowed to do this: {}", message),
                "Ask an administrator for the missing features.",
            ),
            FirewallError::NotFound(what) => Self::not_found(format!("Not found: {}", what)),
            FirewallError::AlreadyResolved { resolving_event_id } => Self::new(
                StatusCode::CONFLICT,
                "ConflictError",
                format!(
                    "This firewall event was already reviewed by event {}.",
                    resolving_event_id
                ),
                "Reload the firewall event to see its current state.",
            ),
            FirewallError::Validation(message) => Self::validation(message),
            FirewallError::StorageError(message) => {
                let error = Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "An unexpected error happened.".to_string(),
                    "Report the error_id to the support team.",
                );
                tracing::error!(error_id = %error.error_id, error = %message, "Storage failure");
                error
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::firewall::FirewallRule;

    #[test]
    fn test_rate_limit_maps_to_429() {
        let error = ApiError::from(FirewallError::RateLimitExceeded {
            rule: FirewallRule::CreateUser,
            event_id: Uuid::now_v7(),
        });

        assert_eq!(error.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.name, "TooManyRequestsError");
        assert_eq!(error.status_code, 429);
    }

    #[test]
    fn test_body_has_stable_fields() {
        let error = ApiError::from(FirewallError::AlreadyResolved {
            resolving_event_id: Uuid::now_v7(),
        });
        let body = serde_json::to_value(&error).unwrap();

        assert_eq!(body["name"], "ConflictError");
        assert_eq!(body["status_code"], 409);
        for field in ["message", "action", "error_id", "request_id"] {
            assert!(body.get(field).is_some(), "missing {}", field);
        }
        assert!(body.get("status").is_none());
    }

    #[test]
    fn test_storage_details_are_not_leaked() {
        let error = ApiError::from(FirewallError::StorageError("disk I/O error".to_string()));
        assert_eq!(error.status_code, 500);
        assert!(!error.message.contains("disk"));
    }
}
