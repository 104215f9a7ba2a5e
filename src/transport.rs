//! The transport boundary.
//!
//! A [`Transport`] sends one attempt and reports what happened as a
//! [`TransportOutcome`]. Failures are classified at the call site instead of
//! being surfaced as errors, so the dispatch engine can decide whether to
//! retry by matching on the outcome.
//!
//! [`ReqwestTransport`] is the default implementation. Cancellation works by
//! dropping the future returned by [`Transport::send`].

use crate::config::ConnectionSettings;
use crate::request::RequestId;
use crate::serializer::Content;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The header carrying the request identity.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Everything a transport needs to send one attempt.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// The request identity.
    pub request_id: RequestId,
    /// The HTTP verb.
    pub method: Method,
    /// The absolute URL, query included.
    pub url: Url,
    /// Headers to send.
    pub headers: HeaderMap,
    /// The serialized body.
    pub body: Option<Content>,
    /// The per-attempt timeout.
    pub timeout: Duration,
}

/// A response as received from the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The numeric status code.
    pub status: u16,
    /// The response headers.
    pub headers: HeaderMap,
    /// The full response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Creates a response.
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The `content-type` header, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Returns `true` if the content type indicates JSON.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|content_type| {
                let media = content_type
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                media == "application/json" || media.ends_with("+json")
            })
            .unwrap_or(false)
    }

    /// Returns `true` if the body is empty or whitespace.
    pub fn is_body_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What happened to one attempt.
#[derive(Debug, Clone)]
pub enum TransportOutcome {
    /// A response was received, whatever its status.
    Completed(RawResponse),
    /// The attempt ran out of time.
    TimedOut,
    /// The remote end could not be reached; the attempt may be retried.
    TransientFailure(String),
    /// The request itself is malformed; retrying cannot help.
    TerminalFailure(String),
}

/// Sends requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one attempt.
    async fn send(&self, request: &TransportRequest) -> TransportOutcome;
}

/// Builds the transport for a client on first use.
pub type TransportFactory =
    Arc<dyn Fn(&ConnectionSettings) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// A [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport for the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn classify(error: reqwest::Error) -> TransportOutcome {
        if error.is_timeout() {
            TransportOutcome::TimedOut
        } else if error.is_builder() {
            TransportOutcome::TerminalFailure(error.to_string())
        } else {
            TransportOutcome::TransientFailure(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> TransportOutcome {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if let Ok(value) = HeaderValue::try_from(request.request_id.to_string()) {
            builder = builder.header(CORRELATION_HEADER, value);
        }

        if let Some(content) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, content.content_type())
                .body(content.bytes().clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Self::classify(e),
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        match response.bytes().await {
            Ok(body) => TransportOutcome::Completed(RawResponse::new(status, headers, body)),
            Err(e) => Self::classify(e),
        }
    }
}
