// src/net/client.rs
// =============================================================================
// This module fetches JSON from federation servers.
//
// Key functionality:
// - One shared reqwest Client (connection pooling across all tasks)
// - A per-request timeout, independent of the task timeout
// - Classifies failures (timeout, connect/DNS, HTTP status, bad JSON)
// - Validates the body against an expected shape before returning it
//
// There is no retry here. If a request fails the whole address task decides
// what to do with it.
//
// Layers:
//   Transport       -> "give me the JSON at this URL" (real HTTP or a test fake)
//   ProtocolClient  -> timeout + shape validation on top of any Transport
// =============================================================================

use super::schema::{self, SchemaError, Shape};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = concat!("threadiverse-scout/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// Every way a single GET can go wrong
//
// All variants carry the URL so the log line alone tells you which server
// misbehaved.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No response within the per-request timeout
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    /// Connection refused, DNS failure, TLS failure, reset, ...
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },
    /// Server answered with a non-2xx status
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    /// Body was not JSON at all
    #[error("{url} returned a body that is not JSON: {message}")]
    Decode { url: String, message: String },
    /// Body was JSON but not the shape we need
    #[error("{url} returned an unexpected body: {source}")]
    Schema {
        url: String,
        #[source]
        source: SchemaError,
    },
    /// The address could not be turned into an endpoint URL
    #[error("invalid endpoint url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl RequestError {
    // True when the server is reachable but does not speak this endpoint.
    //
    // Used to decide whether a different endpoint set is worth trying on the
    // same server. Timeouts and network errors say nothing about the API.
    pub fn is_endpoint_mismatch(&self) -> bool {
        match self {
            RequestError::Status { status, .. } => matches!(status, 400 | 404 | 405 | 501),
            RequestError::Decode { .. } | RequestError::Schema { .. } => true,
            _ => false,
        }
    }
}

/// Something that can GET a URL and hand back its JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request. Must not retry.
    async fn get_json(&self, url: &Url) -> Result<Value, RequestError>;
}

// Lets callers keep a handle on a shared transport
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get_json(&self, url: &Url) -> Result<Value, RequestError> {
        (**self).get_json(url).await
    }
}

// The real transport: HTTPS via reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    // Builds the shared client
    //
    // The overall request deadline is enforced by ProtocolClient, this only
    // bounds the TCP/TLS handshake.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, RequestError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| categorize_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Read the body as bytes first so a non-JSON body becomes Decode
        // instead of a generic reqwest error
        let bytes = response.bytes().await.map_err(|e| categorize_error(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| RequestError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

// Maps reqwest's error kinds onto our taxonomy
fn categorize_error(url: &Url, error: reqwest::Error) -> RequestError {
    let message = if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_redirect() {
        "too many redirects".to_string()
    } else {
        error.to_string()
    };

    RequestError::Network {
        url: url.to_string(),
        message,
    }
}

// Timed, validated GETs on top of any transport
//
// Cloning is cheap when the transport is (HttpTransport wraps an Arc'd
// reqwest Client).
#[derive(Debug, Clone)]
pub struct ProtocolClient<T> {
    transport: T,
    request_timeout: Duration,
}

impl<T: Transport> ProtocolClient<T> {
    pub fn new(transport: T, request_timeout: Duration) -> Self {
        Self {
            transport,
            request_timeout,
        }
    }

    // Fetches `url` and validates it as `S`
    //
    // Parameters:
    //   url: absolute endpoint URL (string form, parsed here)
    //
    // Returns: the typed body or a RequestError describing the cause
    pub async fn get<S: Shape>(&self, url: &str) -> Result<S, RequestError> {
        let parsed = Url::parse(url).map_err(|e| RequestError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let body = tokio::time::timeout(self.request_timeout, self.transport.get_json(&parsed))
            .await
            .map_err(|_| RequestError::Timeout {
                url: url.to_string(),
                timeout: self.request_timeout,
            })??;

        schema::validate::<S>(body).map_err(|source| RequestError::Schema {
            url: url.to_string(),
            source,
        })
    }
}
