//! Per-request errors and their JSON rendering
//!
//! Body shape: {"error":{"type":"...","message":"...","request_id":"req_..."}}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use session_store::SessionError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    /// `error` / `error_description` reported by the identity provider
    #[error("{code}: {description}")]
    Provider { code: String, description: String },

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    GatewayTimeout(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Provider { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::Provider { .. } => "provider_error",
            Self::BadGateway(_) | Self::GatewayTimeout(_) => "upstream_error",
        }
    }

    pub fn into_response_with(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyLoggedIn(_) => Self::Conflict(err.to_string()),
            _ => Self::Unauthorized(err.to_string()),
        }
    }
}

/// `req_<uuid>` identifier echoed in error bodies and logs.
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Provider {
                code: "access_denied".into(),
                description: "user cancelled".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::BadGateway("x".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn session_errors_map_to_unauthorized_except_double_login() {
        assert_eq!(
            ApiError::from(SessionError::AlreadyLoggedIn("bob".into())),
            ApiError::Conflict("user bob is already logged in".into())
        );
        assert_eq!(
            ApiError::from(SessionError::TokenExpired),
            ApiError::Unauthorized("access token expired".into())
        );
    }

    #[tokio::test]
    async fn error_body_carries_type_and_request_id() {
        let resp = ApiError::Provider {
            code: "access_denied".into(),
            description: "user cancelled".into(),
        }
        .into_response_with("req_abc123");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "provider_error");
        assert_eq!(json["error"]["message"], "access_denied: user cancelled");
        assert_eq!(json["error"]["request_id"], "req_abc123");
    }

    #[test]
    fn request_ids_are_prefixed() {
        let id = new_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 36);
    }
}
