use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Public suffix list error: {0}")]
    PublicSuffix(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No model artifact found in {0}")]
    ModelNotFound(String),

    #[error("Invalid model artifact: {0}")]
    ModelLoad(String),

    #[error("Prediction deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::DeadlineExceeded(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            _ => {
                tracing::error!("Internal server error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

/// Failure of a single external lookup. These never leave the extraction
/// pipeline: each one collapses into the default value of its feature.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS resolution failed: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),

    #[error("no WHOIS server known for {0}")]
    NoWhoisServer(String),

    #[error("no registration record for {0}")]
    NotRegistered(String),

    #[error("no usable value: {0}")]
    NoValue(String),

    #[error("redirect chain longer than {0} hops")]
    TooManyRedirects(usize),

    #[error("lookup skipped: {0}")]
    Skipped(&'static str),
}

impl LookupError {
    /// Short label used as the `source` dimension of failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Timeout(_) => "timeout",
            LookupError::Connect(_) => "connect",
            LookupError::Http(_) => "http",
            LookupError::Dns(_) => "dns",
            LookupError::NoWhoisServer(_) => "no_whois_server",
            LookupError::NotRegistered(_) => "not_registered",
            LookupError::NoValue(_) => "no_value",
            LookupError::TooManyRedirects(_) => "too_many_redirects",
            LookupError::Skipped(_) => "skipped",
        }
    }
}

// Helper function for creating URL validation errors
pub fn invalid_url(msg: impl Into<String>) -> AppError {
    AppError::InvalidUrl(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_maps_to_bad_request() {
        let response = invalid_url("ftp://x").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_deadline_maps_to_gateway_timeout() {
        let response = AppError::DeadlineExceeded(100).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_model_errors_are_internal() {
        let response = AppError::ModelLoad("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
