//! Executing [`HttpRequest`] descriptors.
//!
//! The pipeline hands a finished request to a [`Dispatcher`] and gets back
//! the raw status and body. [`HttpDispatcher`] is the production
//! implementation on top of `reqwest`; tests plug in their own.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use pubwire_core::ClientConfig;
use pubwire_protocol::{HttpMethod, HttpRequest, HttpResponse};
use reqwest::{Client, Method};
use tracing::trace;
use url::Url;

use crate::error::{PublishError, TransportError};

/// A boxed future, so that [`Dispatcher`] stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sends a request and returns the raw response.
///
/// Implementations own connection management and timeouts. They must not
/// retry: at most one HTTP call is made per dispatch.
pub trait Dispatcher: Send + Sync {
    /// Executes the request.
    fn dispatch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

/// Dispatcher backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    base_url: Url,
}

impl HttpDispatcher {
    /// Creates a dispatcher for the origin and timeout in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, PublishError> {
        let base_url = config
            .base_url()
            .map_err(|e| TransportError::request(e.to_string()).with_source(e))?;
        Self::with_base_url(base_url, config.request_timeout(), &config.sdk_identifier)
    }

    /// Creates a dispatcher for an explicit base URL.
    pub fn with_base_url(
        base_url: Url,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                TransportError::request(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self { client, base_url })
    }

    /// Returns the base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves the request's path and query against the base URL.
    ///
    /// Fails if URL resolution would rewrite the path, e.g. a `.` or `..`
    /// segment being collapsed.
    pub fn url_for(&self, request: &HttpRequest) -> Result<Url, TransportError> {
        let url = self
            .base_url
            .join(&request.path_and_query())
            .map_err(|e| TransportError::request(format!("invalid request URL: {}", e)).with_source(e))?;
        if url.path() != request.path {
            return Err(TransportError::request(format!(
                "request path {} resolves to {}",
                request.path,
                url.path()
            )));
        }
        Ok(url)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request)?;
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, url);
        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", "application/json; charset=UTF-8")
                .body(body);
        }

        trace!(method = %request.method, path = %request.path, "Sending request");

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            TransportError::body(format!("failed to read response: {}", e)).with_source(e)
        })?;

        trace!(status, bytes = body.len(), "Received response");
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(self.execute(request))
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    let transport = if err.is_timeout() {
        TransportError::timeout(format!("request timed out: {}", err))
    } else if err.is_connect() {
        TransportError::connect(format!("connection failed: {}", err))
    } else {
        TransportError::request(format!("request failed: {}", err))
    };
    transport.with_source(err)
}
