//! Outbound request transport.
//!
//! The dispatcher never talks to the network directly; it hands encoded
//! requests to a [`Transport`]. [`HttpTransport`] is the reqwest-backed
//! implementation used by [`BackendClient`](crate::BackendClient); tests and
//! embedders can plug in their own.

use std::time::Instant;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use reqwest::Url;

use crate::auth::Credentials;
use crate::codec::EncodedRequest;
use crate::error::{LinkError, Result};
use crate::reply::RequestId;
use crate::timeouts::LinkTimeouts;

/// Header carrying the dispatcher's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One encoded request together with its correlation id.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub id: RequestId,
    pub request: EncodedRequest,
}

/// Raw backend response. Decoding is left to the dispatcher.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends encoded requests to the backend.
///
/// An `Err` means no response was obtained (refused, reset, timed out). Any
/// HTTP status, including 4xx/5xx, is a successful send.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, Result<TransportResponse>>;
}

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    base_url: Url,
    http_client: reqwest::Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(base_url: &str, credentials: Credentials, timeouts: &LinkTimeouts) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            LinkError::ConfigurationError(format!("Invalid service URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(LinkError::ConfigurationError(format!(
                "Service URL must use http:// or https://, got '{}'",
                base_url
            )));
        }

        let mut builder = reqwest::Client::builder();
        if !LinkTimeouts::is_no_timeout(timeouts.request_timeout) {
            builder = builder.timeout(timeouts.request_timeout);
        }
        if !LinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
            builder = builder.connect_timeout(timeouts.connection_timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| LinkError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            base_url,
            http_client,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an encoded request. Segments are percent-encoded.
    pub fn url_for(&self, request: &EncodedRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LinkError::ConfigurationError(format!("Service URL '{}' cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(&request.path_segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn execute(
        http_client: reqwest::Client,
        credentials: Credentials,
        url: Url,
        request: TransportRequest,
    ) -> Result<TransportResponse> {
        let mut req_builder = http_client
            .request(request.request.method.clone(), url.clone())
            .header(REQUEST_ID_HEADER, request.id.to_string());
        if let Some(body) = &request.request.body {
            req_builder = req_builder.json(body);
        }
        req_builder = credentials.apply_to_request(req_builder);

        let start = Instant::now();
        debug!(
            "[LINK_HTTP] Sending {} to {} request={}",
            request.request.method,
            url.path(),
            request.id
        );

        let response = req_builder.send().await.map_err(|e| {
            warn!(
                "[LINK_HTTP] Request failed: {} request={} duration_ms={}",
                e,
                request.id,
                start.elapsed().as_millis()
            );
            LinkError::from(e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(
            "[LINK_HTTP] Response received: request={} status={} bytes={} duration_ms={}",
            request.id,
            status,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, Result<TransportResponse>> {
        let url = self.url_for(&request.request);
        let http_client = self.http_client.clone();
        let credentials = self.credentials.clone();
        Box::pin(async move { Self::execute(http_client, credentials, url?, request).await })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}
