//! JSON error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

const UPSTREAM_DETAILS: &str =
    "An error occurred while fetching transactions from Solana. Please try again later.";

/// Errors returned by the HTTP boundary. Every variant renders as
/// `{ "error": ..., "details": ... }`.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid request field, or an unreadable body
    BadRequest(String),
    MethodNotAllowed,
    /// Ledger source failure; relays the upstream status when there is one
    Upstream(trade_history::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Upstream(e) => e
                .status_code()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl From<trade_history::Error> for ApiError {
    fn from(e: trade_history::Error) -> Self {
        match e {
            trade_history::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Upstream(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match self {
            ApiError::BadRequest(msg) => (msg, "The request body is missing a field or has an invalid value."),
            ApiError::MethodNotAllowed => (
                "Method not allowed".to_string(),
                "Use POST with a JSON body.",
            ),
            ApiError::Upstream(e) => {
                error!(status = status.as_u16(), error = %e, "transaction fetch failed");
                (e.to_string(), UPSTREAM_DETAILS)
            }
        };

        let body = Json(json!({
            "error": message,
            "details": details,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_is_relayed() {
        let err = ApiError::Upstream(trade_history::Error::Rpc {
            status: Some(429),
            message: "rate limited".to_string(),
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_upstream_without_status_is_500() {
        let err = ApiError::Upstream(trade_history::Error::Provider("boom".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_input_maps_to_bad_request() {
        let err: ApiError = trade_history::Error::InvalidInput("address is required".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
