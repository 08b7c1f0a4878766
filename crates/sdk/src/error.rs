//! Error types for the Bitrix24 client.

use serde::Deserialize;

/// Result type for client operations.
pub type BitrixResult<T> = Result<T, BitrixError>;

/// Error types that can occur when calling Bitrix24.
#[derive(Debug, thiserror::Error)]
pub enum BitrixError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Bitrix24 returned an error payload.
    #[error("Bitrix24 error {code} (status {status}): {description}")]
    Api {
        status: u16,
        code: String,
        description: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response did not have the expected shape.
    #[error("Unexpected response from {method}: {message}")]
    UnexpectedResponse { method: String, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Error code Bitrix24 uses when the per-webhook request rate is exceeded.
pub const QUERY_LIMIT_EXCEEDED: &str = "QUERY_LIMIT_EXCEEDED";

impl BitrixError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, code, .. } => *status >= 500 || code == QUERY_LIMIT_EXCEEDED,
            _ => false,
        }
    }

    /// Create an API error from a status code and response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            Self::Api {
                status,
                code: error_response.error,
                description: error_response.error_description.unwrap_or_default(),
            }
        } else {
            Self::Api {
                status,
                code: format!("HTTP_{}", status),
                description: body.to_string(),
            }
        }
    }
}

/// Error payload returned by the Bitrix24 REST API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_parses_bitrix_error() {
        let err = BitrixError::from_response(
            400,
            r#"{"error":"INVALID_ARG_VALUE","error_description":"Invalid filter"}"#,
        );

        match err {
            BitrixError::Api { status, code, description } => {
                assert_eq!(status, 400);
                assert_eq!(code, "INVALID_ARG_VALUE");
                assert_eq!(description, "Invalid filter");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_response_plain_body() {
        let err = BitrixError::from_response(502, "Bad Gateway");
        assert!(matches!(err, BitrixError::Api { ref code, .. } if code == "HTTP_502"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_query_limit_is_retryable() {
        let err = BitrixError::from_response(
            503,
            r#"{"error":"QUERY_LIMIT_EXCEEDED","error_description":"Too many requests"}"#,
        );
        assert!(err.is_retryable());

        let err = BitrixError::from_response(401, r#"{"error":"NO_AUTH_FOUND"}"#);
        assert!(!err.is_retryable());
    }
}
