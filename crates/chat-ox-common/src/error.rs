use serde::Deserialize;
use thiserror::Error;

/// Errors raised by the streaming transport
#[derive(Error, Debug)]
pub enum CommonRequestError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint answered with a non-success status and a structured error body
    #[error("HTTP {status}: {message}")]
    Api {
        status: u16,
        message: String,
        r#type: Option<String>,
        code: Option<String>,
    },

    /// The endpoint answered with a non-success status and an unstructured body
    #[error("HTTP {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    /// Invalid event data in streaming response
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// Error originating from the request builder
    #[error("Request builder error: {0}")]
    RequestBuilder(String),

    /// The caller cancelled the operation
    #[error("Request cancelled")]
    Cancelled,
}

impl CommonRequestError {
    /// Whether this error is the distinguished abort condition.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// `{"error": {...}}` envelope used by OpenAI-compatible servers
#[derive(Debug, Deserialize)]
struct ApiErrorPayload {
    /// The nested provider error, if any
    error: Option<ApiErrorBody>,
}

/// Provider error details
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    /// Human readable message
    message: String,
    /// Provider error class
    #[serde(default)]
    r#type: Option<String>,
    /// Provider error code; some servers send numbers here
    #[serde(default, deserialize_with = "string_or_number")]
    code: Option<String>,
}

/// Accept both `"code": "rate_limited"` and `"code": 429`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Parse error response from HTTP status and body
#[must_use]
pub fn parse_error_response(status: reqwest::StatusCode, body: &bytes::Bytes) -> CommonRequestError {
    if let Ok(payload) = serde_json::from_slice::<ApiErrorPayload>(body) {
        if let Some(error) = payload.error {
            return CommonRequestError::Api {
                status: status.as_u16(),
                message: error.message,
                r#type: error.r#type,
                code: error.code,
            };
        }
    }

    CommonRequestError::UnexpectedResponse {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}
