//! Normalization of stream failures into the shape reported to callbacks.

use std::fmt;

use chat_ox_common::CommonRequestError;

/// Errors that can occur while talking to the completion endpoint
pub type ChatRequestError = CommonRequestError;

/// Uniform failure reported through [`crate::StreamCallbacks::on_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    /// Human readable message
    pub message: String,
    /// HTTP status, when one could be recovered
    pub status: Option<u16>,
    /// Provider supplied detail, falling back to the message
    pub detail: Option<String>,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for StreamFailure {}

/// Places a failure may carry a status code and provider detail.
///
/// [`normalize_failure`] consults them in declaration order.
pub trait FailureSource: fmt::Display {
    /// Status reported directly by the endpoint
    fn status(&self) -> Option<u16> {
        None
    }

    /// Status of the HTTP response wrapped by a transport error
    fn response_status(&self) -> Option<u16> {
        None
    }

    /// Status parsed out of an unstructured error response
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Message from the provider's `{"error": {"message": ...}}` body
    fn provider_message(&self) -> Option<String> {
        None
    }
}

/// Build the reported failure from any source.
///
/// Status priority: [`FailureSource::status`], then
/// [`FailureSource::response_status`], then [`FailureSource::status_code`].
/// Detail priority: [`FailureSource::provider_message`], then the top-level
/// message. An empty message becomes `"Network error"`.
pub fn normalize_failure(source: &dyn FailureSource) -> StreamFailure {
    let message = source.to_string();
    let message = if message.trim().is_empty() {
        "Network error".to_string()
    } else {
        message
    };

    let status = source
        .status()
        .or_else(|| source.response_status())
        .or_else(|| source.status_code());

    let detail = source
        .provider_message()
        .filter(|m| !m.is_empty())
        .or_else(|| Some(message.clone()));

    StreamFailure {
        message,
        status,
        detail,
    }
}

impl FailureSource for CommonRequestError {
    fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn response_status(&self) -> Option<u16> {
        match self {
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn provider_message(&self) -> Option<String> {
        match self {
            Self::Api { message, .. } => Some(message.clone()),
            _ => None,
        }
    }
}

impl From<&CommonRequestError> for StreamFailure {
    fn from(err: &CommonRequestError) -> Self {
        normalize_failure(err)
    }
}
