//! The kiosk's client for the bakery backend.
//!
//! Every request goes through [`retry_with_backoff`], so transient failures (connection refused, timeouts, 5xx) are
//! retried with exponential backoff before the caller sees them. 4xx responses are returned straight away.
use std::time::Duration;

use bytes::Bytes;
use kiosk_common::{helpers::env_or_default, Secret};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client,
    RequestBuilder,
    Response,
};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{
    events::{StreamHooks, Topic},
    payment::{NewQrPayment, OrderId, PaymentStatus, PaymentStatusSource, QrPayment},
    retry::{retry_with_backoff, RequestError, RetryPolicy, DEFAULT_API_BASE_DELAY, DEFAULT_API_MAX_ATTEMPTS},
    stream::{EventStreamClient, HttpStreamTransport, StreamConfig, StreamError},
};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8360";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token: Option<Secret<String>>,
    /// Retry policy for JSON API calls.
    pub retry: RetryPolicy,
    /// Retry policy for plain fetches, see [`BackendClient::fetch`].
    pub fetch_retry: RetryPolicy,
    /// Per-request timeout. Event streams only use it as a connect timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(default_api_url())
    }
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: with_trailing_slash(base_url),
            token: None,
            retry: RetryPolicy::api_default(),
            fetch_retry: RetryPolicy::fetch_default(),
            timeout: DEFAULT_API_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Secret<String>) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fetch_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.fetch_retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env_or_default() -> Self {
        let base_url = env_or_default("KIOSK_API_URL", default_api_url());
        let token = Secret::non_empty(std::env::var("KIOSK_API_TOKEN").ok());
        if token.is_none() {
            info!("🪛️ KIOSK_API_TOKEN is not set. Requests to the backend will not be authenticated.");
        }
        let max_attempts = env_or_default("KIOSK_API_MAX_ATTEMPTS", DEFAULT_API_MAX_ATTEMPTS);
        let base_delay = env_or_default("KIOSK_API_RETRY_DELAY_MS", DEFAULT_API_BASE_DELAY.as_millis() as u64);
        let timeout = env_or_default("KIOSK_API_TIMEOUT_MS", DEFAULT_API_TIMEOUT.as_millis() as u64);
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_delay),
            ..RetryPolicy::api_default()
        };
        Self {
            token,
            retry,
            timeout: Duration::from_millis(timeout),
            ..Self::new(base_url)
        }
    }
}

fn default_api_url() -> Url {
    // The constant is a valid URL, so this only fails if someone edits it badly.
    Url::parse(DEFAULT_API_URL).unwrap_or_else(|e| panic!("DEFAULT_API_URL is not a valid URL. {e}"))
}

// `Url::join` replaces the last path segment unless the base ends in a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    config: ClientConfig,
}

impl BackendClient {
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("Bakery Kiosk")
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RequestError::InvalidRequest(format!("Failed to create the HTTP client. {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolves `path` against the configured base URL. Leading slashes are ignored, so a base URL with a path prefix
    /// is kept.
    pub fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RequestError::InvalidRequest(format!("Failed to join {path} to the API URL. {e}")))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {}", token.reveal())),
            None => req,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let url = self.url(path)?;
        retry_with_backoff(&self.config.retry, &format!("GET {path}"), |_attempt| {
            let req = self.authorized(self.client.get(url.clone()));
            async move { json_response(req.send().await?).await }
        })
        .await
    }

    /// POSTs `body` as JSON. The request is retried like any other, so only use it for endpoints that are idempotent.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        retry_with_backoff(&self.config.retry, &format!("POST {path}"), |_attempt| {
            let req = self.authorized(self.client.post(url.clone())).json(body);
            async move { json_response(req.send().await?).await }
        })
        .await
    }

    /// Fetches a raw resource (menu images, static content) using the fetch retry policy.
    pub async fn fetch(&self, path: &str) -> Result<Bytes, RequestError> {
        let url = self.url(path)?;
        retry_with_backoff(&self.config.fetch_retry, &format!("fetch {path}"), |_attempt| {
            let req = self.client.get(url.clone());
            async move {
                let res = checked(req.send().await?).await?;
                Ok::<_, RequestError>(res.bytes().await?)
            }
        })
        .await
    }

    pub async fn health(&self) -> Result<String, RequestError> {
        let url = self.url("/health")?;
        retry_with_backoff(&self.config.retry, "GET /health", |_attempt| {
            let req = self.client.get(url.clone());
            async move {
                let res = checked(req.send().await?).await?;
                Ok::<_, RequestError>(res.text().await?)
            }
        })
        .await
    }

    pub async fn payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, RequestError> {
        let mut url = self.url("/payment/status")?;
        url.path_segments_mut()
            .map_err(|_| RequestError::InvalidRequest("The API URL cannot have a path".into()))?
            .pop_if_empty()
            .push(order_id.as_str());
        let path = url.path().to_string();
        retry_with_backoff(&self.config.retry, &format!("GET {path}"), |_attempt| {
            let req = self.authorized(self.client.get(url.clone()));
            async move { json_response(req.send().await?).await }
        })
        .await
    }

    /// Requests a QR payment for the order. The backend hands back the same QR code for repeat requests on an unpaid
    /// order, which is what makes retrying this POST safe.
    pub async fn create_qr_payment(&self, payment: &NewQrPayment) -> Result<QrPayment, RequestError> {
        debug!("💳️ Requesting a QR payment of {} for order {}", payment.amount, payment.order_id);
        self.post_json("/payment/create-qr", payment).await
    }

    /// A stream configuration for `topic` on this backend, using the client's token.
    pub fn stream_config(&self, topic: Topic) -> Result<StreamConfig, RequestError> {
        let url = self.url(&topic.path())?;
        Ok(StreamConfig::new(url).with_token(self.config.token.clone()))
    }

    /// Creates (but does not connect) an event stream client for `topic`.
    pub fn event_stream(
        &self,
        topic: Topic,
        hooks: StreamHooks,
    ) -> Result<EventStreamClient<HttpStreamTransport>, StreamError> {
        let config = self.stream_config(topic)?;
        let transport = HttpStreamTransport::new(self.config.timeout)?;
        Ok(EventStreamClient::new(transport, config, hooks))
    }
}

impl PaymentStatusSource for BackendClient {
    async fn fetch_payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, RequestError> {
        self.payment_status(order_id).await
    }
}

async fn checked(res: Response) -> Result<Response, RequestError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res.text().await.unwrap_or_default();
    Err(RequestError::Status { status: status.as_u16(), message })
}

async fn json_response<T: DeserializeOwned>(res: Response) -> Result<T, RequestError> {
    let body = checked(res).await?.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| RequestError::InvalidResponse(e.to_string()))
}
