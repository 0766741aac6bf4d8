//! The network exchanger the transport decorates.
//!
//! [`Exchange`] is the only seam between the transport and the network:
//! given a request, produce a response or fail. Production code uses
//! [`ReqwestExchange`]; tests substitute scripted fakes.

use crate::{BoxError, Error, Request, Response, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Sends one request and returns the raw response.
///
/// Implementations must be safe for concurrent use. Failures should keep
/// their cause in the error chain so the transport can tell transient
/// failures from permanent ones (see [`classify`](crate::classify)).
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Performs a single exchange without retrying.
    async fn exchange(&self, request: &Request) -> std::result::Result<Response, BoxError>;
}

/// An [`Exchange`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExchange {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestExchange {
    /// Wraps an existing `reqwest::Client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Builds a client with the given TLS and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the TLS backend cannot be
    /// initialised.
    pub fn build(insecure: bool, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self::new(client).with_timeout(timeout))
    }

    /// Sets the per-exchange timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Exchange for ReqwestExchange {
    async fn exchange(&self, request: &Request) -> std::result::Result<Response, BoxError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response::new(status, headers, body.to_vec()))
    }
}
