use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Wraps the core error for HTTP responses; the status code comes from
/// the error's own mapping.
#[derive(Debug)]
pub struct ApiError(pub vendra_core::Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<vendra_core::Error> for ApiError {
    fn from(error: vendra_core::Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(category = self.0.category(), "request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "category": self.0.category(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError(vendra_core::Error::validation("bad input"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let err = ApiError(vendra_core::Error::not_found("no such order"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ApiError(vendra_core::Error::concurrent("lost update"));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
