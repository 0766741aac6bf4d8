//! Client configuration and credentials.
//!
//! All settings live in an explicit [`ClientConfig`] handed to the client at
//! construction; nothing is read from process-wide state afterwards.

use crate::{Error, Result, RetryPolicy, TraceMode};
use http::HeaderValue;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Domain the service is reached under when none is configured.
pub const DEFAULT_DOMAIN: &str = "observeinc.com";

/// A sensitive string that never shows up in `Debug` or `Display` output.
///
/// The wrapped value is only reachable through
/// [`expose_secret`](Self::expose_secret).
///
/// ```
/// use metaclient::Secret;
///
/// let token = Secret::new("sk-1234");
/// assert_eq!(format!("{:?}", token), "[REDACTED]");
/// assert_eq!(token.expose_secret(), "sk-1234");
/// ```
// Not Clone: copies of secret material should be deliberate.
pub struct Secret {
    inner: String,
}

impl Secret {
    /// Wraps a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Explicitly exposes the secret value.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// The composite key (`<customer id> <token>`) proving the caller's identity.
///
/// Sent as `Authorization: Bearer <customer id> <token>`.
#[derive(Debug)]
pub struct Credential {
    key: Secret,
}

impl Credential {
    /// Combines a customer id and a token (or access key) into a credential.
    pub fn new(customer_id: &str, token: &str) -> Self {
        Self {
            key: Secret::new(format!("{} {}", customer_id, token)),
        }
    }

    /// The composite key.
    pub fn expose_secret(&self) -> &str {
        self.key.expose_secret()
    }

    /// Renders the `Authorization` header value, marked sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the key contains characters
    /// not allowed in a header.
    pub fn header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.key.expose_secret()))
            .map_err(|_| {
                Error::ConfigurationError(
                    "credential contains characters not allowed in a header".to_string(),
                )
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Everything needed to construct a [`Client`](crate::Client).
///
/// # Examples
///
/// ```
/// use metaclient::{ClientConfig, RetryPolicy, Secret};
/// use std::time::Duration;
///
/// let mut config = ClientConfig::new("101");
/// config.token = Some(Secret::new("token"));
/// config.retry = RetryPolicy::new(5, Duration::from_secs(1));
///
/// assert_eq!(config.base_url().unwrap().as_str(), "https://101.observeinc.com/");
/// ```
#[derive(Debug)]
pub struct ClientConfig {
    /// Customer identifier; also the first label of the service host.
    pub customer_id: String,

    /// Long-lived API token.
    pub token: Option<Secret>,

    /// Email to log in with when no token is set.
    pub user_email: Option<String>,

    /// Password to log in with when no token is set.
    pub user_password: Option<Secret>,

    /// Domain suffix of the service host.
    pub domain: String,

    /// Overrides the `https://<customer>.<domain>` base URL. A path prefix
    /// (e.g. a proxy mount point) is kept when endpoints are resolved.
    pub base_url: Option<Url>,

    /// Value for the `User-Agent` header.
    pub user_agent: Option<String>,

    /// Skip TLS certificate verification.
    pub insecure: bool,

    /// Per-exchange timeout.
    pub timeout: Option<Duration>,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,

    /// How wire-trace rendering failures are handled.
    pub trace_mode: TraceMode,
}

impl ClientConfig {
    /// Creates a configuration for `customer_id` with default settings.
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            token: None,
            user_email: None,
            user_password: None,
            domain: DEFAULT_DOMAIN.to_string(),
            base_url: None,
            user_agent: None,
            insecure: false,
            timeout: None,
            retry: RetryPolicy::default(),
            trace_mode: TraceMode::default(),
        }
    }

    /// Reads the configuration from `OBSERVE_*` environment variables.
    ///
    /// | Variable                | Field           |
    /// |-------------------------|-----------------|
    /// | `OBSERVE_CUSTOMER`      | `customer_id`   |
    /// | `OBSERVE_TOKEN`         | `token`         |
    /// | `OBSERVE_DOMAIN`        | `domain`        |
    /// | `OBSERVE_USER_EMAIL`    | `user_email`    |
    /// | `OBSERVE_USER_PASSWORD` | `user_password` |
    /// | `OBSERVE_INSECURE`      | `insecure`      |
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if `OBSERVE_CUSTOMER` is unset
    /// or `OBSERVE_INSECURE` is not a boolean.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let customer_id = get("OBSERVE_CUSTOMER").ok_or_else(|| {
            Error::ConfigurationError("OBSERVE_CUSTOMER is required".to_string())
        })?;

        let mut config = Self::new(customer_id);
        config.token = get("OBSERVE_TOKEN").map(Secret::new);
        config.user_email = get("OBSERVE_USER_EMAIL");
        config.user_password = get("OBSERVE_USER_PASSWORD").map(Secret::new);
        if let Some(domain) = get("OBSERVE_DOMAIN") {
            config.domain = domain;
        }
        if let Some(insecure) = get("OBSERVE_INSECURE") {
            config.insecure = parse_bool(&insecure).ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "OBSERVE_INSECURE must be a boolean, got {:?}",
                    insecure
                ))
            })?;
        }

        Ok(config)
    }

    /// The base URL every endpoint is resolved against.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if customer id and domain do not form a
    /// valid host.
    pub fn base_url(&self) -> Result<Url> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(&format!(
                "https://{}.{}",
                self.customer_id, self.domain
            ))?),
        }
    }

    /// The credential derived from the customer id and token, if a token is
    /// set.
    pub fn credential(&self) -> Option<Credential> {
        self.token
            .as_ref()
            .map(|token| Credential::new(&self.customer_id, token.expose_secret()))
    }

    /// Email and password, when both are set.
    pub fn login_credentials(&self) -> Option<(&str, &Secret)> {
        match (&self.user_email, &self.user_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password)),
            _ => None,
        }
    }
}

/// Resolves `path` below `base`, keeping any path prefix of `base`.
///
/// `https://host/observe` and `https://host/observe/` both resolve
/// `/v1/meta` to `https://host/observe/v1/meta`.
pub(crate) fn resolve(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefix = format!("{}/", base.path());
        base.set_path(&prefix);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
