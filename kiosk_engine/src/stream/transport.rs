use std::{future::Future, time::Duration};

use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt, TryStreamExt};
use kiosk_common::Secret;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL},
    Client,
};
use thiserror::Error;
use url::Url;

use crate::retry::RequestError;

pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("Could not connect to the event stream. {0}")]
    Connect(String),
    #[error("The event stream was refused with status {status}. {message}")]
    Status { status: u16, message: String },
    #[error("The event stream broke off. {0}")]
    Body(String),
    #[error("The server closed the event stream")]
    Closed,
}

impl From<RequestError> for StreamError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Status { status, message } => Self::Status { status, message },
            other => Self::Connect(other.to_string()),
        }
    }
}

/// Opens the long-lived response body of a server-push endpoint.
pub trait StreamTransport: Send + Sync + 'static {
    fn open(
        &self,
        url: &Url,
        token: Option<&Secret<String>>,
    ) -> impl Future<Output = Result<ByteStream, StreamError>> + Send;
}

/// `text/event-stream` over plain HTTP(S), using reqwest's streaming response bodies.
#[derive(Clone)]
pub struct HttpStreamTransport {
    client: Client,
}

impl HttpStreamTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, StreamError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        // No overall request timeout: it would cut every stream off after that long.
        let client = Client::builder()
            .user_agent("Bakery Kiosk Event Stream")
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl StreamTransport for HttpStreamTransport {
    fn open(
        &self,
        url: &Url,
        token: Option<&Secret<String>>,
    ) -> impl Future<Output = Result<ByteStream, StreamError>> + Send {
        let mut req = self.client.get(url.clone());
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token.reveal()));
        }
        let url = url.clone();
        async move {
            trace!("📡️ Opening {url}");
            let res = req.send().await.map_err(RequestError::from)?;
            let status = res.status();
            if !status.is_success() {
                let message = res.text().await.unwrap_or_default();
                return Err(StreamError::Status { status: status.as_u16(), message });
            }
            let body = res.bytes_stream().map_err(|e| StreamError::Body(e.to_string())).boxed();
            Ok(body)
        }
    }
}
