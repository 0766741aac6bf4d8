//! Wire-level tracing of requests and responses.
//!
//! The transport renders every outgoing request and every received response
//! as an HTTP/1.1-style text dump and hands it to a [`TraceSink`]. The default
//! sink, [`LogSink`], writes dumps at debug level under the `metaclient::wire`
//! target, so they can be enabled independently of other logs:
//!
//! ```text
//! RUST_LOG=metaclient::wire=debug
//! ```
//!
//! Dumps never carry secrets. `Authorization` headers are replaced with
//! `[REDACTED]`, as are bodies of requests marked
//! [sensitive](crate::Request::with_sensitive_body).

use crate::{Error, Request, Response, Result};
use http::header::{AUTHORIZATION, HOST};
use http::HeaderMap;
use std::fmt::Write as _;
use std::sync::Arc;

const REDACTED: &str = "[REDACTED]";

/// Receives rendered wire dumps.
pub trait TraceSink: Send + Sync {
    /// Records one rendered request or response.
    fn record(&self, dump: &str);

    /// Returns `false` when dumps would be discarded, letting the transport
    /// skip rendering them.
    fn enabled(&self) -> bool {
        true
    }
}

/// Routes dumps to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, dump: &str) {
        tracing::debug!(target: "metaclient::wire", "{}", dump);
    }

    fn enabled(&self) -> bool {
        tracing::enabled!(target: "metaclient::wire", tracing::Level::DEBUG)
    }
}

/// What happens when a request or response cannot be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceMode {
    /// Log the rendering failure and carry on with the call.
    #[default]
    BestEffort,

    /// Fail the call with [`Error::Trace`] before anything is sent.
    Strict,
}

/// A sink paired with the mode that decides how rendering failures behave.
#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn TraceSink>,
    mode: TraceMode,
}

impl Tracer {
    /// Creates a tracer writing to `sink`.
    pub fn new(sink: Arc<dyn TraceSink>, mode: TraceMode) -> Self {
        Self { sink, mode }
    }

    /// The configured failure mode.
    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    /// Traces an outgoing request.
    pub fn request(&self, request: &Request) -> Result<()> {
        if self.skip() {
            return Ok(());
        }
        self.emit("request", dump_request(request))
    }

    /// Traces a received response.
    pub fn response(&self, response: &Response) -> Result<()> {
        if self.skip() {
            return Ok(());
        }
        self.emit("response", dump_response(response))
    }

    // Strict mode renders even when nobody listens, so a malformed request
    // fails the same way whatever the log level.
    fn skip(&self) -> bool {
        self.mode == TraceMode::BestEffort && !self.sink.enabled()
    }

    fn emit(&self, what: &str, rendered: Result<String>) -> Result<()> {
        match rendered {
            Ok(dump) => {
                self.sink.record(&dump);
                Ok(())
            }
            Err(e) if self.mode == TraceMode::Strict => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping {} trace", what);
                Ok(())
            }
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(Arc::new(LogSink), TraceMode::default())
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer").field("mode", &self.mode).finish()
    }
}

/// Renders a request as an HTTP/1.1 text dump.
///
/// # Errors
///
/// Returns [`Error::Trace`] if the URL has no host or a header value is not
/// visible ASCII.
pub fn dump_request(request: &Request) -> Result<String> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| Error::Trace(format!("request URL {} has no host", url)))?;

    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut out = String::new();
    let _ = write!(out, "{} {} HTTP/1.1\r\n", request.method(), target);
    if !request.headers().contains_key(HOST) {
        match url.port() {
            Some(port) => {
                let _ = write!(out, "Host: {}:{}\r\n", host, port);
            }
            None => {
                let _ = write!(out, "Host: {}\r\n", host);
            }
        }
    }
    write_headers(&mut out, request.headers())?;
    out.push_str("\r\n");

    if let Some(body) = request.body() {
        if request.has_sensitive_body() {
            out.push_str(REDACTED);
        } else {
            out.push_str(&String::from_utf8_lossy(body));
        }
    }

    Ok(out)
}

/// Renders a response as an HTTP/1.1 text dump.
///
/// # Errors
///
/// Returns [`Error::Trace`] if a header value is not visible ASCII.
pub fn dump_response(response: &Response) -> Result<String> {
    let mut out = String::new();
    let _ = write!(
        out,
        "HTTP/1.1 {} {}\r\n",
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or("")
    );
    write_headers(&mut out, &response.headers)?;
    out.push_str("\r\n");
    out.push_str(&response.text());
    Ok(out)
}

fn write_headers(out: &mut String, headers: &HeaderMap) -> Result<()> {
    for (name, value) in headers {
        if *name == AUTHORIZATION {
            let _ = write!(out, "{}: {}\r\n", name, REDACTED);
            continue;
        }
        let value = value
            .to_str()
            .map_err(|e| Error::Trace(format!("header {}: {}", name, e)))?;
        let _ = write!(out, "{}: {}\r\n", name, value);
    }
    Ok(())
}
