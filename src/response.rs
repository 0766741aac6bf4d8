//! Responses and the typed outcome of one exchange.
//!
//! The transport never hands callers a status code to interpret. It classifies
//! every completed exchange into an [`Outcome`] first, and only `200` and
//! `422` keep their body.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;

/// A response received from the server.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub body: Vec<u8>,

    /// The time from the first dispatch until this response arrived,
    /// including retry waits.
    pub latency: Duration,

    /// The number of dispatches made to obtain this response.
    ///
    /// This will be `1` for requests that succeeded on the first try.
    pub attempts: usize,
}

impl Response {
    /// Creates a new `Response` for a single attempt.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            latency: Duration::ZERO,
            attempts: 1,
        }
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body attached
    /// when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            let raw_response = self.text().into_owned();
            tracing::error!(
                error = %e,
                status = self.status.as_u16(),
                raw_response = %raw_response,
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response,
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// The classified result of one completed exchange.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// `200 OK`; the body is passed through untouched.
    Success(Response),

    /// `422 Unprocessable Entity`; the body still describes what went wrong
    /// and is passed through for the caller to interpret.
    ValidationError(Response),

    /// `401 Unauthorized`; the body is discarded.
    Unauthorized,

    /// Any other status; the body is discarded.
    UnexpectedStatus(StatusCode),
}

impl Outcome {
    /// Classifies a response by its status code.
    pub fn from_response(response: Response) -> Self {
        match response.status {
            StatusCode::OK => Outcome::Success(response),
            StatusCode::UNPROCESSABLE_ENTITY => Outcome::ValidationError(response),
            StatusCode::UNAUTHORIZED => Outcome::Unauthorized,
            status => Outcome::UnexpectedStatus(status),
        }
    }

    /// The status code this outcome was classified from.
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Success(response) | Outcome::ValidationError(response) => response.status,
            Outcome::Unauthorized => StatusCode::UNAUTHORIZED,
            Outcome::UnexpectedStatus(status) => *status,
        }
    }

    /// Returns `true` only for `200 OK`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns the response for `200` and `422`, the matching error otherwise.
    ///
    /// A `422` is not an error at this layer: the payload reports its own
    /// failure and the caller decodes it.
    pub fn into_result(self) -> Result<Response> {
        match self {
            Outcome::Success(response) | Outcome::ValidationError(response) => Ok(response),
            Outcome::Unauthorized => Err(Error::Unauthorized),
            Outcome::UnexpectedStatus(status) => Err(Error::UnexpectedStatus(status)),
        }
    }
}
