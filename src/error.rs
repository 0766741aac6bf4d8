//! Error types for metadata service calls.
//!
//! Every failure a caller can observe is one variant of [`Error`]. The
//! transport recovers transient network failures on its own; everything else
//! surfaces here unchanged so callers can match on the kind of failure instead
//! of inspecting HTTP details.

use crate::graphql::GraphQlError;
use http::StatusCode;

/// A boxed, thread-safe error produced by a network exchanger.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for metadata service calls.
///
/// # Examples
///
/// ```no_run
/// use metaclient::{Client, Error};
///
/// # async fn example(client: Client) {
/// match client.run("{ currentUser { id } }", Default::default()).await {
///     Ok(data) => println!("{:?}", data),
///     Err(Error::Unauthorized) => eprintln!("credential rejected, log in again"),
///     Err(Error::UnexpectedStatus(status)) => eprintln!("server answered {}", status),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The exchange with the server failed below the HTTP layer.
    ///
    /// The underlying error is kept as the source so the transient classifier
    /// can walk its chain. When this surfaces after retries, it is the error of
    /// the last attempt.
    #[error("request failed: {0}")]
    Transport(#[source] BoxError),

    /// The server rejected the credential (status 401).
    #[error("authorization error")]
    Unauthorized,

    /// The server answered with a status the client does not handle.
    #[error("received unexpected status code {}", .0.as_u16())]
    UnexpectedStatus(StatusCode),

    /// A plain REST call did not return `200 OK`.
    ///
    /// Carries the lower-cased canonical status text, e.g. `forbidden`.
    #[error("{0}")]
    RequestFailed(String),

    /// The exchange completed but the body did not have the expected shape.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The GraphQL endpoint reported errors in the response body.
    #[error(
        "graphql: {}",
        .0.first().map(|e| e.message.as_str()).unwrap_or("unknown error")
    )]
    GraphQl(Vec<GraphQlError>),

    /// A result payload reported `success: false`.
    #[error("{}", rejected_message(.0))]
    Rejected(String),

    /// A request or response could not be rendered for the wire trace.
    ///
    /// Only surfaced when the client runs with [`TraceMode::Strict`](crate::TraceMode::Strict).
    #[error("failed to render wire dump: {0}")]
    Trace(String),

    /// The call was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

fn rejected_message(message: &str) -> String {
    if message.is_empty() {
        "request failed".to_string()
    } else {
        format!("request failed: {:?}", message)
    }
}

impl Error {
    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Only transport failures whose error chain carries a temporary signal
    /// qualify. Status-based failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(source) => crate::classify::is_transient(source.as_ref()),
            _ => false,
        }
    }

    /// Returns `true` for the credential-rejected sentinel.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Error::UnexpectedStatus(status) => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for metadata service calls.
pub type Result<T> = std::result::Result<T, Error>;
