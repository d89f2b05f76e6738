use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Structured error type for all API handlers.
///
/// Each variant maps to an HTTP status code, a machine-readable code string,
/// and a human-readable message. Implements [`IntoResponse`] so handlers can
/// return `Result<T, ApiError>` directly.
#[derive(Debug)]
pub enum ApiError {
    /// 401 - No authentication credentials provided.
    AuthRequired,
    /// 403 - Credentials provided but invalid.
    AuthInvalid,
    /// 401 - Login attempt with a wrong password.
    LoginFailed,
    /// 400 - Malformed or invalid request.
    InvalidRequest(String),
    /// 404 - A specific task ID was not found.
    TaskNotFound(String),
    /// 404 - A specific session ID was not found.
    SessionNotFound(String),
    /// 502 - The gateway rejected or never received the call.
    GatewayUnavailable(String),
    /// 500 - The JSON store failed to persist.
    StoreFailed(String),
    /// 500 - Catch-all internal error.
    InternalError(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthRequired => StatusCode::UNAUTHORIZED,
            ApiError::AuthInvalid => StatusCode::FORBIDDEN,
            ApiError::LoginFailed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::StoreFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthRequired => "auth_required",
            ApiError::AuthInvalid => "auth_invalid",
            ApiError::LoginFailed => "login_failed",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::TaskNotFound(_) => "task_not_found",
            ApiError::SessionNotFound(_) => "session_not_found",
            ApiError::GatewayUnavailable(_) => "gateway_unavailable",
            ApiError::StoreFailed(_) => "store_failed",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    /// Returns a human-readable error message.
    pub fn message(&self) -> String {
        match self {
            ApiError::AuthRequired => {
                "Authentication required. Provide a token via the Authorization header."
                    .to_string()
            }
            ApiError::AuthInvalid => "Invalid authentication token.".to_string(),
            ApiError::LoginFailed => "Invalid password.".to_string(),
            ApiError::InvalidRequest(detail) => format!("Invalid request: {}.", detail),
            ApiError::TaskNotFound(id) => format!("Task not found: {}.", id),
            ApiError::SessionNotFound(id) => format!("Session not found: {}.", id),
            ApiError::GatewayUnavailable(detail) => {
                format!("Gateway unavailable: {}.", detail)
            }
            ApiError::StoreFailed(detail) => format!("Store failure: {}.", detail),
            ApiError::InternalError(detail) => format!("Internal error: {}.", detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => ApiError::SessionNotFound(id),
            GatewayError::Unavailable(detail) => ApiError::GatewayUnavailable(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(id) => ApiError::TaskNotFound(id),
            other => ApiError::StoreFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    /// Helper: convert an ApiError into a response and extract the status
    /// and parsed JSON body.
    async fn response_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = Body::new(response.into_body())
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn auth_required_status() {
        let (status, _) = response_parts(ApiError::AuthRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_invalid_status() {
        let (status, _) = response_parts(ApiError::AuthInvalid).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_failed_status() {
        let (status, _) = response_parts(ApiError::LoginFailed).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn task_not_found_status_and_body() {
        let (status, json) = response_parts(ApiError::TaskNotFound("t-9".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "task_not_found");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("t-9"));
    }

    #[tokio::test]
    async fn gateway_unavailable_is_bad_gateway() {
        let (status, json) =
            response_parts(ApiError::GatewayUnavailable("timed out".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "gateway_unavailable");
    }

    #[tokio::test]
    async fn invalid_request_status() {
        let (status, json) = response_parts(ApiError::InvalidRequest("title required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("title required"));
    }

    #[test]
    fn gateway_errors_convert() {
        let err: ApiError = GatewayError::NotFound("agent-x".into()).into();
        assert!(matches!(err, ApiError::SessionNotFound(_)));
        let err: ApiError = GatewayError::Unavailable("refused".into()).into();
        assert!(matches!(err, ApiError::GatewayUnavailable(_)));
    }

    #[test]
    fn store_errors_convert() {
        let err: ApiError = StoreError::TaskNotFound("t1".into()).into();
        assert!(matches!(err, ApiError::TaskNotFound(_)));
    }
}
