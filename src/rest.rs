//! Plain JSON requests for endpoints outside the GraphQL surface.
//!
//! Only credential exchange uses this path. It shares the [`Transport`] with
//! the RPC client but reports failures coarsely: anything other than `200`
//! becomes the lower-cased status text, except `401`, which stays the
//! [`Error::Unauthorized`] sentinel.

use crate::config::resolve;
use crate::{Error, Outcome, Request, Result, Transport};
use http::header::ACCEPT;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Issues JSON requests against paths below a base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    transport: Arc<Transport>,
    base_url: Url,
}

impl RestClient {
    /// Creates a client resolving paths against `base_url`.
    pub fn new(transport: Arc<Transport>, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    /// Sends `body` (or no body) to `path` and decodes the `200` response
    /// into `R`.
    ///
    /// `path` is resolved below the base URL, keeping its path prefix.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestFailed`] with the lower-cased status text for any
    ///   status other than `200` and `401`
    /// - [`Error::Unauthorized`] for `401`
    /// - [`Error::DeserializationFailed`] if the body does not match `R`
    /// - transport errors unchanged
    pub async fn request<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(method, path, body, false).await
    }

    /// Like [`request`](Self::request), keeping the body out of wire traces.
    pub async fn request_sensitive<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(method, path, body, true).await
    }

    /// Sends a `GET` with no body.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.request::<(), R>(Method::GET, path, None).await
    }

    async fn call<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        sensitive: bool,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = resolve(&self.base_url, path)?;
        let mut request = Request::new(method, url).with_header(ACCEPT.as_str(), "application/json")?;
        if let Some(body) = body {
            request = request.with_json(body)?;
        }
        if sensitive {
            request = request.with_sensitive_body();
        }

        self.send(request).await
    }

    /// Sends an already-built request and decodes the `200` response into
    /// `R`.
    pub async fn send<R: DeserializeOwned>(&self, request: Request) -> Result<R> {
        let response = match self.transport.send(request).await? {
            Outcome::Success(response) => response,
            Outcome::Unauthorized => return Err(Error::Unauthorized),
            other => return Err(Error::RequestFailed(status_text(other.status()))),
        };

        response.json()
    }
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason.to_lowercase(),
        None => format!("status {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReqwestExchange, RetryPolicy};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, base: &str) -> RestClient {
        let exchange = Arc::new(ReqwestExchange::build(false, None).unwrap());
        let transport = Transport::builder(exchange)
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap();
        let base_url = Url::parse(&format!("{}{}", server.uri(), base)).unwrap();
        RestClient::new(Arc::new(transport), base_url)
    }

    #[test]
    fn test_status_text_is_lower_cased_canonical_reason() {
        assert_eq!(status_text(StatusCode::FORBIDDEN), "forbidden");
        assert_eq!(
            status_text(StatusCode::UNPROCESSABLE_ENTITY),
            "unprocessable entity"
        );
        assert_eq!(
            status_text(StatusCode::from_u16(599).unwrap()),
            "status 599"
        );
    }

    #[tokio::test]
    async fn test_json_body_is_sent_and_response_decoded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/echo"))
            .and(body_json(json!({"name": "logs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let value: Value = client(&mock_server, "")
            .request(Method::POST, "/v1/echo", Some(&json!({"name": "logs"})))
            .await
            .unwrap();

        assert_eq!(value, json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_absent_body_is_omitted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let value: Value = client(&mock_server, "").get("/v1/status").await.unwrap();
        assert_eq!(value["ok"], json!(true));

        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
        assert!(requests[0].headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_deserialization_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "")
            .get::<Value>("/v1/status")
            .await
            .unwrap_err();

        match err {
            Error::DeserializationFailed {
                raw_response,
                status,
                ..
            } => {
                assert_eq!(raw_response, "not json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_success_statuses() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/validate"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"errorMessage": "bad input"})),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, "");

        let err = client
            .request::<_, Value>(Method::POST, "/v1/validate", Some(&json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestFailed(_)));
        assert_eq!(err.to_string(), "unprocessable entity");

        let err = client
            .request::<_, Value>(Method::POST, "/v1/private", Some(&json!({})))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_base_path_prefix_is_kept() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/observe/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let _: Value = client(&mock_server, "/observe")
            .get("/v1/status")
            .await
            .unwrap();
    }
}
