use bon::Builder;
use chat_ox_common::{CancellationToken, Endpoint, RequestBuilder, RequestConfig};
use core::fmt;
#[cfg(feature = "leaky-bucket")]
use leaky_bucket::RateLimiter;
#[cfg(feature = "leaky-bucket")]
use std::sync::Arc;

use crate::{
    ChatRequest, StreamCallbacks, StreamOptions,
    aggregator::StreamOutcome,
    batch::BatchPolicy,
    stream::{OpenedStream, StreamHandle, drive_stream},
};

const BASE_URL: &str = "http://localhost:8010/v1";
const DEFAULT_API_KEY: &str = "dummy";
const COMPLETIONS_PATH: &str = "chat/completions";
const USER_AGENT: &str = concat!("chat-ox/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the endpoint base URL
pub const API_BASE_ENV: &str = "CHAT_OX_API_BASE";
/// Environment variable holding the bearer token
pub const API_KEY_ENV: &str = "CHAT_OX_API_KEY";

/// Client for an OpenAI-compatible streaming chat-completions endpoint.
#[derive(Clone, Builder)]
pub struct ChatClient {
    #[builder(default = DEFAULT_API_KEY.to_string(), into)]
    pub(crate) api_key: String,
    #[builder(default)]
    pub(crate) client: reqwest::Client,
    #[cfg(feature = "leaky-bucket")]
    pub(crate) leaky_bucket: Option<Arc<RateLimiter>>,
    #[builder(default = BASE_URL.to_string(), into)]
    pub(crate) base_url: String,
    /// Text batching applied to every stream opened by this client
    #[builder(default)]
    pub(crate) batch_policy: BatchPolicy,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChatClient {
    /// Client for the local agent endpoint with the placeholder key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `CHAT_OX_API_BASE` and `CHAT_OX_API_KEY`, keeping the defaults for
    /// whichever is unset.
    pub fn from_env() -> Self {
        Self::builder()
            .maybe_base_url(std::env::var(API_BASE_ENV).ok())
            .maybe_api_key(std::env::var(API_KEY_ENV).ok())
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch_policy
    }

    fn request_builder(&self) -> RequestBuilder {
        let config = RequestConfig::new(&self.base_url)
            .with_bearer_auth(&self.api_key)
            .with_user_agent(USER_AGENT);
        RequestBuilder::new(self.client.clone(), config)
    }

    /// Open the completion stream and return once response headers arrive.
    ///
    /// # Errors
    ///
    /// Connection failures, non-success statuses and cancellation before the
    /// response head are all reported here.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> OpenedStream {
        #[cfg(feature = "leaky-bucket")]
        if let Some(ref limiter) = self.leaky_bucket {
            limiter.acquire_one().await;
        }

        log::debug!(
            "opening stream: model={} messages={}",
            request.model,
            request.messages.len()
        );
        let endpoint = Endpoint::new(COMPLETIONS_PATH);
        self.request_builder()
            .open_stream(&endpoint, Some(request), cancel)
            .await
    }

    /// Stream a completion on the current task, delivering notifications to
    /// `callbacks`.
    ///
    /// Failures are reported through `on_error`; the returned outcome mirrors
    /// what the callbacks saw.
    pub async fn run_stream<C: StreamCallbacks>(
        &self,
        options: StreamOptions,
        callbacks: C,
    ) -> StreamOutcome {
        let request = options.to_request();
        let cancel = options.cancel.unwrap_or_default();
        drive_stream(
            self.open_stream(&request, cancel.clone()),
            callbacks,
            self.batch_policy,
            cancel,
        )
        .await
    }

    /// Stream a completion on a new task.
    ///
    /// Uses the token from `options` when one is set, so cancelling either it
    /// or the returned handle stops the stream.
    pub fn spawn_stream<C>(&self, options: StreamOptions, callbacks: C) -> StreamHandle
    where
        C: StreamCallbacks + Send + 'static,
    {
        let request = options.to_request();
        let cancel = options.cancel.unwrap_or_default();

        let client = self.clone();
        let token = cancel.clone();
        let open = async move { client.open_stream(&request, token).await };

        StreamHandle::spawn(open, callbacks, self.batch_policy, cancel)
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_key", &"[REDACTED]")
            .field("client", &self.client)
            .field("base_url", &self.base_url)
            .field("batch_policy", &self.batch_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let client = ChatClient::new();
        assert_eq!(client.base_url(), "http://localhost:8010/v1");
        assert_eq!(client.api_key, "dummy");
        assert_eq!(client.batch_policy(), BatchPolicy::default());
    }

    #[test]
    fn test_builder_overrides() {
        let policy = BatchPolicy {
            min_size: 5,
            interval: Duration::from_millis(10),
        };
        let client = ChatClient::builder()
            .base_url("https://agent.example/v1")
            .api_key("secret")
            .batch_policy(policy)
            .build();

        assert_eq!(client.base_url(), "https://agent.example/v1");
        assert_eq!(client.batch_policy(), policy);
        assert!(!format!("{client:?}").contains("secret"));
    }
}
