//! HTTP transport seam
//!
//! The request executor describes one wire-ready request; a transport
//! carries it. Splitting the two keeps request building (URL assembly,
//! auth overlay, body encoding) testable without sockets and lets tests
//! and demos substitute canned transports.
//!
//! The default transport is a thin wrapper over a shared
//! [`reqwest::Client`]. Neither layer imposes its own deadline: requests
//! wait as long as the underlying client allows, and callers that want a
//! timeout supply a client configured with one.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// Payload handed to the transport, already reduced to wire-ready form.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    /// No body
    Empty,
    /// JSON document, sent verbatim with a JSON content type
    Json(serde_json::Value),
    /// Flat form fields, sent urlencoded
    Form(Vec<(String, String)>),
}

/// One fully-built request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method name as recorded ("GET", "POST", ...)
    pub method: String,
    /// Final URL including any appended query string
    pub url: String,
    /// Header name/value pairs, auth overlay already applied
    pub headers: Vec<(String, String)>,
    /// Request body
    pub payload: RequestPayload,
}

/// Raw transport-level response, body still undecoded.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body_text: String,
}

/// Carries one built request to the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and collect the full response body.
    ///
    /// Err only for transport-level failures (DNS, refused connection,
    /// protocol violation). An HTTP error status is a normal response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Default transport backed by a shared `reqwest::Client`.
///
/// [`ReqwestTransport::new`] keeps the client's stock settings, which
/// means connection pooling and no request timeout. Use
/// [`ReqwestTransport::with_client`] for a tuned client:
///
/// ```rust,no_run
/// use replaykit::ReqwestTransport;
/// use std::time::Duration;
///
/// # fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = reqwest::Client::builder()
///     .timeout(Duration::from_secs(20))
///     .build()?;
/// let transport = ReqwestTransport::with_client(client);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a stock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| Error::invalid_input(format!("bad HTTP method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.payload {
            RequestPayload::Empty => builder,
            RequestPayload::Json(value) => builder.json(&value),
            RequestPayload::Form(fields) => builder.form(&fields),
        };

        debug!("Sending {} {}", request.method, request.url);
        let response = builder.send().await.map_err(|e| {
            Error::network_caused_by(format!("{} {} failed", request.method, request.url), e)
        })?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let body_text = response
            .text()
            .await
            .map_err(|e| Error::network_caused_by("failed to read response body", e))?;

        debug!("Received {} ({} bytes)", status, body_text.len());
        Ok(TransportResponse {
            status,
            status_text,
            headers,
            body_text,
        })
    }
}
