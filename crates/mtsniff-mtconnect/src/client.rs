//! HTTP probe client for MTConnect agents

use anyhow::{Context, Result};
use async_trait::async_trait;
use mtsniff_core::ProbeContext;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::document::{parse_document, DevicesDocument, Document, DocumentError, ErrorDocument};

/// Default timeout for a single probe request
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

/// Transport-level probe failure
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Agent at {url} returned HTTP {status} without an MTConnect document")]
    HttpStatus { url: String, status: u16 },
    #[error("Invalid response from {url}: {source}")]
    InvalidDocument {
        url: String,
        #[source]
        source: DocumentError,
    },
}

/// Completion of a single probe
///
/// Exactly one variant is produced per call. The correlation context is
/// returned unchanged with both document outcomes.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Agent answered with an `MTConnectDevices` document
    Success {
        document: DevicesDocument,
        context: ProbeContext,
    },
    /// Agent answered with an `MTConnectError` document
    ProtocolError {
        document: ErrorDocument,
        context: ProbeContext,
    },
    /// Connection, HTTP or parse failure
    TransportError { cause: ProbeError },
}

/// Issues MTConnect probe requests
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Probe `endpoint`, handing `context` back with the outcome
    async fn probe(&self, endpoint: &str, context: ProbeContext) -> ProbeOutcome;
}

/// Probe endpoint for an agent listening on `address:port`
pub fn probe_url(address: Ipv4Addr, port: u16) -> String {
    format!("http://{}:{}/probe", address, port)
}

/// `ProtocolClient` backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpProbeClient {
    client: reqwest::Client,
}

impl HttpProbeClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        // LAN agents are never reached through a proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<(u16, String), ProbeError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/xml, text/xml")
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| ProbeError::Request {
            url: url.to_string(),
            source,
        })?;

        trace!(url = %url, status = status, body_len = body.len(), "Probe response received");
        Ok((status, body))
    }
}

#[async_trait]
impl ProtocolClient for HttpProbeClient {
    async fn probe(&self, endpoint: &str, context: ProbeContext) -> ProbeOutcome {
        debug!(url = %endpoint, "Sending MTConnect probe");

        let (status, body) = match self.fetch(endpoint).await {
            Ok(r) => r,
            Err(cause) => return ProbeOutcome::TransportError { cause },
        };

        classify(endpoint, status, &body, context)
    }
}

/// Map an HTTP status and body onto a probe outcome
fn classify(url: &str, status: u16, body: &str, context: ProbeContext) -> ProbeOutcome {
    let success = (200..300).contains(&status);

    match (parse_document(body), success) {
        (Ok(Document::Devices(document)), true) => {
            debug!(
                url = %url,
                sender = ?document.header.sender,
                version = ?document.header.version,
                instance_id = ?document.header.instance_id,
                devices = document.devices.len(),
                "Probe succeeded"
            );
            ProbeOutcome::Success { document, context }
        }
        // Agents answer 4xx/5xx with an error document
        (Ok(Document::Error(document)), _) => {
            debug!(
                url = %url,
                status = status,
                errors = ?document.errors,
                "Agent returned MTConnect error"
            );
            ProbeOutcome::ProtocolError { document, context }
        }
        (Err(source), true) => ProbeOutcome::TransportError {
            cause: ProbeError::InvalidDocument {
                url: url.to_string(),
                source,
            },
        },
        (_, false) => ProbeOutcome::TransportError {
            cause: ProbeError::HttpStatus {
                url: url.to_string(),
                status,
            },
        },
    }
}
