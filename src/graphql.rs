//! The GraphQL RPC client.
//!
//! [`RpcClient`] posts `{query, variables}` to the metadata endpoint through
//! the [`Transport`] and returns the `data` object as a generic map. Callers
//! that want typed records go through [`RpcClient::run_as`], which turns a
//! shape mismatch into [`Error::DeserializationFailed`].

use crate::config::resolve;
use crate::{CancellationToken, Error, Request, Result, Transport};
use http::header::ACCEPT;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Path of the GraphQL endpoint below the service base URL.
pub const GRAPHQL_PATH: &str = "/v1/meta";

/// The query used to check connectivity and credentials.
pub const VERIFY_QUERY: &str = "{ currentUser { id } }";

/// A GraphQL request: query text plus named variables.
///
/// # Examples
///
/// ```
/// use metaclient::GraphQlRequest;
/// use serde_json::json;
///
/// let request = GraphQlRequest::new("query ($id: ObjectId!) { dataset(id: $id) { label } }")
///     .var("id", "41000100")
///     .unwrap();
///
/// assert_eq!(request.variables()["id"], json!("41000100"));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest {
    query: String,
    variables: Map<String, Value>,
}

impl GraphQlRequest {
    /// Creates a request with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
        }
    }

    /// Sets a variable, replacing any previous value under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `value` cannot be
    /// represented as JSON.
    pub fn var<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.variables.insert(name.into(), value);
        Ok(self)
    }

    /// Replaces all variables.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// The query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The variables.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Human-readable description.
    pub message: String,

    /// Path to the failing field, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Server-specific extra information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQlError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

/// The `{data, errors}` envelope of a GraphQL response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
    /// The result object; `null` or absent when the query failed.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors reported by the server.
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// Success flag returned by mutations that report their own failure.
///
/// A `422` response body often has this shape; the transport passes it
/// through and the caller checks it.
///
/// ```
/// use metaclient::ResultStatus;
///
/// let status: ResultStatus = serde_json::from_str(r#"{"errorMessage":"bad input"}"#).unwrap();
/// assert_eq!(status.into_result().unwrap_err().to_string(), "request failed: \"bad input\"");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStatus {
    /// Whether the operation succeeded.
    #[serde(default)]
    pub success: bool,

    /// Why it failed.
    #[serde(default)]
    pub error_message: String,

    /// Structured failure details.
    #[serde(default)]
    pub detailed_info: Option<Map<String, Value>>,
}

impl ResultStatus {
    /// Returns [`Error::Rejected`] unless `success` is set.
    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Error::Rejected(self.error_message))
        }
    }
}

/// Issues GraphQL requests through a [`Transport`].
#[derive(Debug, Clone)]
pub struct RpcClient {
    transport: Arc<Transport>,
    endpoint: Url,
}

impl RpcClient {
    /// Creates a client posting to `endpoint`.
    pub fn new(transport: Arc<Transport>, endpoint: Url) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// Creates a client for the GraphQL endpoint below `base_url`, keeping
    /// any path prefix of `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the endpoint cannot be joined.
    pub fn for_base_url(transport: Arc<Transport>, base_url: &Url) -> Result<Self> {
        Ok(Self::new(transport, resolve(base_url, GRAPHQL_PATH)?))
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Runs the minimal identity query.
    ///
    /// Used at construction time to fail fast on an unreachable service or a
    /// rejected credential.
    pub async fn verify(&self) -> Result<()> {
        self.execute(GraphQlRequest::new(VERIFY_QUERY), &CancellationToken::new())
            .await?;
        tracing::debug!(endpoint = %self.endpoint, "Verified connectivity");
        Ok(())
    }

    /// Runs `query` with `variables` and returns the `data` object.
    ///
    /// Every call is a fresh exchange. Transport errors are returned as-is.
    pub async fn run(&self, query: &str, variables: Map<String, Value>) -> Result<Map<String, Value>> {
        let request = GraphQlRequest::new(query).with_variables(variables);
        self.execute(request, &CancellationToken::new()).await
    }

    /// Runs `query` and decodes the `data` object into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if `data` does not match `T`.
    pub async fn run_as<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Map<String, Value>,
    ) -> Result<T> {
        let data = self.run(query, variables).await?;
        decode_data(data)
    }

    /// Sends `request`, aborting when `cancel` fires.
    pub async fn execute(
        &self,
        request: GraphQlRequest,
        cancel: &CancellationToken,
    ) -> Result<Map<String, Value>> {
        let http_request = Request::new(Method::POST, self.endpoint.clone())
            .with_header(ACCEPT.as_str(), "application/json")?
            .with_json(&request)?;

        let response = self
            .transport
            .send_with_cancel(http_request, cancel)
            .await?
            .into_result()?;

        let envelope: GraphQlResponse = response.json()?;
        if !envelope.errors.is_empty() {
            tracing::warn!(
                errors = envelope.errors.len(),
                first = %envelope.errors[0].message,
                "GraphQL request returned errors"
            );
            return Err(Error::GraphQl(envelope.errors));
        }

        match envelope.data {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(data)) => Ok(data),
            Some(other) => Err(Error::DeserializationFailed {
                raw_response: response.text().into_owned(),
                serde_error: format!("expected `data` to be an object, got {}", type_name(&other)),
                status: response.status,
            }),
        }
    }
}

fn decode_data<T: DeserializeOwned>(data: Map<String, Value>) -> Result<T> {
    let data = Value::Object(data);
    T::deserialize(&data).map_err(|e| Error::DeserializationFailed {
        raw_response: data.to_string(),
        serde_error: e.to_string(),
        status: StatusCode::OK,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
