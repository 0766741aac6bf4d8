//! Client for the metadata service.
//!
//! The [`Client`] type is the main entry point. It owns one [`Transport`]
//! shared by the GraphQL [`RpcClient`] and the REST login path. Use
//! [`ClientBuilder`] (or [`Client::connect`] with a [`ClientConfig`]) to
//! create one; construction fails unless the service answers the identity
//! query.

use crate::{
    CancellationToken, ClientConfig, Credential, Error, Exchange, GraphQlRequest, RestClient,
    Result, RetryPolicy, ReqwestExchange, RpcClient, Secret, TraceMode, TraceSink, Transport,
};
use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Path of the REST login endpoint, resolved below the service base URL.
pub const LOGIN_PATH: &str = "/v1/login";

/// A verified connection to the metadata service.
///
/// The client is cheap to clone and safe to share between tasks; clones use
/// the same transport and connection pool.
///
/// # Examples
///
/// ```no_run
/// use metaclient::Client;
/// use serde_json::{json, Map};
///
/// # async fn example() -> Result<(), metaclient::Error> {
/// let client = Client::builder("101")
///     .token("my-token")
///     .user_agent("my-tool/1.0")
///     .build()
///     .await?;
///
/// let mut vars = Map::new();
/// vars.insert("id".to_string(), json!("41000100"));
/// let data = client
///     .run("query ($id: ObjectId!) { dataset(id: $id) { label } }", vars)
///     .await?;
/// println!("{:?}", data["dataset"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    customer_id: String,
    base_url: Url,
    transport: Arc<Transport>,
    rpc: RpcClient,
    rest: RestClient,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    user_email: &'a str,
    user_password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_key: String,
    #[serde(default)]
    ok: bool,
}

impl Client {
    /// Creates a new `ClientBuilder` for `customer_id`.
    pub fn builder(customer_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(customer_id)
    }

    /// Connects using `config` and the default HTTP stack.
    ///
    /// When the config has no token but carries an email and password, the
    /// client first logs in and uses the returned access key. Either way it
    /// then runs [`verify`](Self::verify).
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, login fails, or verification
    /// fails.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with(config, None, None).await
    }

    async fn connect_with(
        config: ClientConfig,
        exchange: Option<Arc<dyn Exchange>>,
        trace_sink: Option<Arc<dyn TraceSink>>,
    ) -> Result<Self> {
        let exchange: Arc<dyn Exchange> = match exchange {
            Some(exchange) => exchange,
            None => Arc::new(ReqwestExchange::build(config.insecure, config.timeout)?),
        };

        let mut credential = config.credential();
        if credential.is_none() {
            if let Some((email, password)) = config.login_credentials() {
                let bootstrap = Self::assemble(&config, exchange.clone(), trace_sink.clone(), None)?;
                let access_key = bootstrap.login(email, password.expose_secret()).await?;
                credential = Some(Credential::new(&config.customer_id, &access_key));
            }
        }

        if credential.is_none() {
            tracing::debug!(
                customer_id = %config.customer_id,
                "No credential configured, connecting unauthenticated"
            );
        }

        let client = Self::assemble(&config, exchange, trace_sink, credential)?;
        client.verify().await?;

        tracing::info!(
            customer_id = %client.inner.customer_id,
            base_url = %client.inner.base_url,
            "Connected to metadata service"
        );
        Ok(client)
    }

    fn assemble(
        config: &ClientConfig,
        exchange: Arc<dyn Exchange>,
        trace_sink: Option<Arc<dyn TraceSink>>,
        credential: Option<Credential>,
    ) -> Result<Self> {
        let base_url = config.base_url()?;

        let mut builder = Transport::builder(exchange)
            .maybe_credential(credential)
            .retry_policy(config.retry)
            .trace_mode(config.trace_mode);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(sink) = trace_sink {
            builder = builder.trace_sink(sink);
        }
        let transport = Arc::new(builder.build()?);

        let rpc = RpcClient::for_base_url(transport.clone(), &base_url)?;
        let rest = RestClient::new(transport.clone(), base_url.clone());

        Ok(Client {
            inner: Arc::new(ClientInner {
                customer_id: config.customer_id.clone(),
                base_url,
                transport,
                rpc,
                rest,
            }),
        })
    }

    /// Checks that the service is reachable and accepts the credential.
    pub async fn verify(&self) -> Result<()> {
        self.inner.rpc.verify().await
    }

    /// Runs a raw GraphQL query and returns the `data` object.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example(client: metaclient::Client) -> Result<(), metaclient::Error> {
    /// let data = client.run("{ currentUser { id } }", Default::default()).await?;
    /// assert!(data.contains_key("currentUser"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, query: &str, variables: Map<String, Value>) -> Result<Map<String, Value>> {
        self.inner.rpc.run(query, variables).await
    }

    /// Runs a raw GraphQL query and decodes the `data` object into `T`.
    pub async fn run_as<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Map<String, Value>,
    ) -> Result<T> {
        self.inner.rpc.run_as(query, variables).await
    }

    /// Runs a prepared GraphQL request, aborting when `cancel` fires.
    pub async fn execute(
        &self,
        request: GraphQlRequest,
        cancel: &CancellationToken,
    ) -> Result<Map<String, Value>> {
        self.inner.rpc.execute(request, cancel).await
    }

    /// Exchanges an email and password for a long-lived access key.
    ///
    /// The password is kept out of wire traces.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] when the service answers `401`
    /// - [`Error::RequestFailed`] with the lower-cased status text (e.g.
    ///   `forbidden`) for any other refusal
    /// - [`Error::Rejected`] when it answers `200` without an access key
    pub async fn login(&self, user: &str, password: &str) -> Result<String> {
        tracing::info!(user = %user, "Exchanging user credentials for an access key");

        let body = LoginRequest {
            user_email: user,
            user_password: password,
        };
        let response: LoginResponse = self
            .inner
            .rest
            .request_sensitive(Method::POST, LOGIN_PATH, Some(&body))
            .await?;

        if response.access_key.is_empty() {
            return Err(Error::Rejected(format!(
                "login returned no access key (ok: {})",
                response.ok
            )));
        }

        Ok(response.access_key)
    }

    /// The GraphQL client.
    pub fn rpc(&self) -> &RpcClient {
        &self.inner.rpc
    }

    /// The plain REST helper.
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    /// The shared transport.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.inner.transport
    }

    /// The base URL endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("customer_id", &self.inner.customer_id)
            .field("base_url", &self.inner.base_url.as_str())
            .field("transport", &self.inner.transport)
            .finish()
    }
}

/// Builder for configuring and connecting a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use metaclient::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), metaclient::Error> {
/// let client = ClientBuilder::new("101")
///     .login_credentials("me@example.com", "password")
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::new(5, Duration::from_secs(1)))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    exchange: Option<Arc<dyn Exchange>>,
    trace_sink: Option<Arc<dyn TraceSink>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(customer_id))
    }

    /// Starts from an existing configuration, e.g. one read from the
    /// environment.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            exchange: None,
            trace_sink: None,
        }
    }

    /// Sets the API token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(Secret::new(token));
        self
    }

    /// Sets the email and password to log in with when no token is set.
    pub fn login_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user_email = Some(email.into());
        self.config.user_password = Some(Secret::new(password));
        self
    }

    /// Sets the domain suffix of the service host.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.config.domain = domain.into();
        self
    }

    /// Overrides the `https://<customer>.<domain>` base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.config.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Skips TLS certificate verification.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    /// Sets the per-exchange timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy for transient failures.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Sets how wire-trace rendering failures are handled.
    pub fn trace_mode(mut self, mode: TraceMode) -> Self {
        self.config.trace_mode = mode;
        self
    }

    /// Sends wire dumps to `sink` instead of the debug log.
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// Replaces the HTTP stack, e.g. with a test fake.
    pub fn exchange(mut self, exchange: Arc<dyn Exchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Connects and verifies the configured `Client`.
    ///
    /// # Errors
    ///
    /// See [`Client::connect`].
    pub async fn build(self) -> Result<Client> {
        Client::connect_with(self.config, self.exchange, self.trace_sink).await
    }
}
