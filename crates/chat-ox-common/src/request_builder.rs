use crate::{
    error::{self, CommonRequestError},
    streaming::SseParser,
};
use async_stream::try_stream;
use futures_util::stream::BoxStream;
use reqwest::{RequestBuilder as ReqwestRequestBuilder, header::HeaderMap};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A streaming endpoint, relative to the configured base URL
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub path: String,
}

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Configuration for request building
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>`
    pub bearer_token: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn with_bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// An open server-sent-events response.
///
/// The header set is available as soon as the response head has been
/// received; `events` lazily pulls and decodes the body.
pub struct SseStream<T> {
    pub headers: HeaderMap,
    pub events: BoxStream<'static, Result<T, CommonRequestError>>,
}

impl<T> std::fmt::Debug for SseStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Generic request builder that handles common HTTP patterns
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    /// Shared connection pool
    client: reqwest::Client,
    /// Base URL, auth and headers applied to every request
    config: RequestConfig,
}

impl RequestBuilder {
    #[must_use]
    pub fn new(client: reqwest::Client, config: RequestConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Build a JSON `POST` to the given endpoint
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible so header validation can be added
    /// without breaking callers.
    pub fn build_request(
        &self,
        endpoint: &Endpoint,
    ) -> Result<ReqwestRequestBuilder, CommonRequestError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.path.trim_start_matches('/')
        );

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json");

        if let Some(ref token) = self.config.bearer_token {
            req = req.bearer_auth(token);
        }

        if let Some(ref user_agent) = self.config.user_agent {
            req = req.header("user-agent", user_agent);
        }

        Ok(req)
    }

    /// Open a streaming request and return once the response head arrives.
    ///
    /// `"stream": true` is inserted into the JSON body. The token is observed
    /// while connecting, while reading an error body, and before every event;
    /// once it fires the operation reports [`CommonRequestError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Fails on connection errors, non-success statuses, a body that is not a
    /// JSON object, or cancellation before the head arrives.
    pub async fn open_stream<T, B>(
        &self,
        endpoint: &Endpoint,
        body: Option<&B>,
        cancel: CancellationToken,
    ) -> Result<SseStream<T>, CommonRequestError>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize + ?Sized,
    {
        let mut req = self.build_request(endpoint)?;

        if let Some(body) = body {
            let mut obj = match serde_json::to_value(body)? {
                Value::Object(map) => map,
                other => {
                    return Err(CommonRequestError::RequestBuilder(format!(
                        "Streaming body must be a JSON object, got {other}"
                    )));
                }
            };
            obj.insert("stream".to_string(), Value::Bool(true));

            let payload = Value::Object(obj);
            log::trace!("STREAM {} payload: {}", endpoint.path, payload);
            req = req.json(&payload);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CommonRequestError::Cancelled),
            response = req.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let bytes = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CommonRequestError::Cancelled),
                bytes = response.bytes() => bytes?,
            };
            log::debug!("STREAM {} failed with HTTP {}", endpoint.path, status.as_u16());
            return Err(error::parse_error_response(status, &bytes));
        }

        let headers = response.headers().clone();
        let mut parser = SseParser::from_response(response);

        let events = Box::pin(try_stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(CommonRequestError::Cancelled),
                    event = parser.next_event::<T>() => event,
                }?;

                match next {
                    Some(event) => yield event,
                    None => break,
                }
            }
        });

        Ok(SseStream { headers, events })
    }
}
