//! The authenticating, retrying transport.
//!
//! [`Transport`] wraps an [`Exchange`] and is the single point every request
//! passes through. For each call it:
//!
//! 1. sets the configured `User-Agent`
//! 2. traces the request, before any credential is attached
//! 3. attaches the `Authorization` header
//! 4. dispatches, retrying transient failures per the [`RetryPolicy`]
//! 5. traces the response, whatever its status
//! 6. classifies the status into an [`Outcome`]

use crate::classify::is_transient;
use crate::{
    CancellationToken, Credential, Error, Exchange, Outcome, Request, Response, Result,
    RetryPolicy, TraceMode, TraceSink, Tracer,
};
use http::header::{AUTHORIZATION, USER_AGENT};
use http::HeaderValue;
use std::sync::Arc;
use tokio::time::Instant;

/// Decorates an [`Exchange`] with credentials, tracing, retries and status
/// classification.
///
/// The transport holds no per-call state; one instance may serve any number
/// of concurrent calls.
///
/// # Examples
///
/// ```no_run
/// use metaclient::{Credential, Outcome, Request, ReqwestExchange, RetryPolicy, Transport};
/// use http::Method;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), metaclient::Error> {
/// let transport = Transport::builder(Arc::new(ReqwestExchange::build(false, None)?))
///     .credential(Credential::new("101", "token"))
///     .retry_policy(RetryPolicy::new(3, Duration::from_secs(1)))
///     .build()?;
///
/// let url = url::Url::parse("https://101.example.com/v1/meta")?;
/// match transport.send(Request::new(Method::GET, url)).await? {
///     Outcome::Success(response) => println!("{}", response.text()),
///     other => println!("status {}", other.status()),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Transport {
    exchange: Arc<dyn Exchange>,
    authorization: Option<HeaderValue>,
    user_agent: Option<HeaderValue>,
    retry_policy: RetryPolicy,
    tracer: Tracer,
}

impl Transport {
    /// Creates a new `TransportBuilder` around `exchange`.
    pub fn builder(exchange: Arc<dyn Exchange>) -> TransportBuilder {
        TransportBuilder::new(exchange)
    }

    /// The retry policy fixed at construction.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns `true` if requests carry a credential.
    pub fn is_authenticated(&self) -> bool {
        self.authorization.is_some()
    }

    /// Sends a request and classifies the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when dispatch fails permanently or
    /// retries run out, and [`Error::Trace`] when tracing is strict and the
    /// request cannot be rendered. Status codes never produce an error here;
    /// they are reported through the [`Outcome`].
    pub async fn send(&self, request: Request) -> Result<Outcome> {
        self.send_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), aborting with [`Error::Cancelled`] as soon
    /// as `cancel` fires, whether during a dispatch or a retry wait.
    pub async fn send_with_cancel(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if let Some(user_agent) = &self.user_agent {
            request.set_header(USER_AGENT, user_agent.clone());
        }

        self.tracer.request(&request)?;

        if let Some(authorization) = &self.authorization {
            request.set_header(AUTHORIZATION, authorization.clone());
        }

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Executing HTTP request"
        );

        let start_time = Instant::now();
        let mut retries = 0;
        let mut result = self.dispatch(&request, cancel).await;

        while let Err(Error::Transport(source)) = &result {
            if !is_transient(source.as_ref()) {
                break;
            }
            let Some(delay) = self.retry_policy.delay_for_attempt(retries + 1) else {
                break;
            };
            retries += 1;

            tracing::warn!(
                error = %source,
                attempt = retries,
                max_attempts = self.retry_policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Request failed with temporary error, retrying after delay"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }

            result = self.dispatch(&request, cancel).await;
        }

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempts = retries + 1,
                    method = %request.method(),
                    url = %request.url(),
                    "Request failed"
                );
                return Err(e);
            }
        };
        response.attempts = retries + 1;
        response.latency = start_time.elapsed();

        self.tracer.response(&response)?;

        tracing::info!(
            status = response.status.as_u16(),
            latency_ms = response.latency.as_millis() as u64,
            attempts = response.attempts,
            "Received HTTP response"
        );

        let outcome = Outcome::from_response(response);
        match &outcome {
            Outcome::Unauthorized => {
                tracing::warn!(url = %request.url(), "Credential rejected (401)");
            }
            Outcome::UnexpectedStatus(status) => {
                tracing::error!(
                    status = status.as_u16(),
                    url = %request.url(),
                    "Unexpected status"
                );
            }
            Outcome::Success(_) | Outcome::ValidationError(_) => {}
        }

        Ok(outcome)
    }

    async fn dispatch(&self, request: &Request, cancel: &CancellationToken) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            result = self.exchange.exchange(request) => result.map_err(Error::Transport),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("authenticated", &self.is_authenticated())
            .field("user_agent", &self.user_agent)
            .field("retry_policy", &self.retry_policy)
            .field("tracer", &self.tracer)
            .finish()
    }
}

/// Builder for configuring and creating a [`Transport`].
pub struct TransportBuilder {
    exchange: Arc<dyn Exchange>,
    credential: Option<Credential>,
    user_agent: Option<String>,
    retry_policy: RetryPolicy,
    trace_sink: Option<Arc<dyn TraceSink>>,
    trace_mode: TraceMode,
}

impl TransportBuilder {
    /// Creates a builder with no credential, no user agent, the default
    /// retry policy and best-effort logging to `tracing`.
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            exchange,
            credential: None,
            user_agent: None,
            retry_policy: RetryPolicy::default(),
            trace_sink: None,
            trace_mode: TraceMode::default(),
        }
    }

    /// Attaches `credential` to every request.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Same as [`credential`](Self::credential), accepting an absent one.
    pub fn maybe_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Sets the `User-Agent` header on every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the retry policy for transient failures.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sends wire dumps to `sink` instead of the debug log.
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// Sets how tracing failures are handled.
    pub fn trace_mode(mut self, mode: TraceMode) -> Self {
        self.trace_mode = mode;
        self
    }

    /// Builds the configured `Transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the credential or user agent
    /// cannot be used as a header value.
    pub fn build(self) -> Result<Transport> {
        let authorization = self
            .credential
            .as_ref()
            .map(Credential::header_value)
            .transpose()?;

        let user_agent = self
            .user_agent
            .map(|ua| {
                HeaderValue::try_from(ua).map_err(|e| {
                    Error::ConfigurationError(format!("Invalid user agent: {}", e))
                })
            })
            .transpose()?;

        let tracer = match self.trace_sink {
            Some(sink) => Tracer::new(sink, self.trace_mode),
            None => Tracer::new(Arc::new(crate::LogSink), self.trace_mode),
        };

        Ok(Transport {
            exchange: self.exchange,
            authorization,
            user_agent,
            retry_policy: self.retry_policy,
            tracer,
        })
    }
}
