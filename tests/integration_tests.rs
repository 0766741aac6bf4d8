//! Integration tests using wiremock to simulate the metadata service.

use metaclient::{Client, ClientBuilder, ClientConfig, Error, RetryPolicy};
use serde::Deserialize;
use serde_json::{json, Map};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IDENTITY: &str = r#"{"data":{"currentUser":{"id":"1"}}}"#;

async fn mount_verify(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_string_contains("currentUser"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .mount(server)
        .await;
}

fn builder(server: &MockServer) -> ClientBuilder {
    Client::builder("101")
        .token("secret")
        .base_url(server.uri())
        .unwrap()
        .retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
}

#[tokio::test]
async fn test_connect_and_run() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    let client = builder(&mock_server).build().await.unwrap();
    let data = client
        .run("{ currentUser { id } }", Map::new())
        .await
        .unwrap();

    assert_eq!(data["currentUser"], json!({"id": "1"}));
}

#[tokio::test]
async fn test_headers_are_attached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(header("authorization", "Bearer 101 secret"))
        .and(header("user-agent", "my-tool/1.0"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .expect(1)
        .mount(&mock_server)
        .await;

    builder(&mock_server)
        .user_agent("my-tool/1.0")
        .build()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_variables_are_sent() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_json(json!({
            "query": "query ($id: ObjectId!) { dataset(id: $id) { label } }",
            "variables": {"id": "41000100"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"dataset": {"label": "logs"}}})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();

    let mut vars = Map::new();
    vars.insert("id".to_string(), json!("41000100"));
    let data = client
        .run("query ($id: ObjectId!) { dataset(id: $id) { label } }", vars)
        .await
        .unwrap();

    assert_eq!(data["dataset"]["label"], json!("logs"));
}

#[tokio::test]
async fn test_unauthorized_fails_connect_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = builder(&mock_server).build().await;

    match result {
        Err(e) => {
            assert!(e.is_unauthorized());
            assert_eq!(e.to_string(), "authorization error");
        }
        Ok(_) => panic!("Expected Unauthorized"),
    }
}

#[tokio::test]
async fn test_unexpected_status() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_string_contains("datasets"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let err = client.run("{ datasets { id } }", Map::new()).await.unwrap_err();

    assert!(matches!(err, Error::UnexpectedStatus(status) if status.as_u16() == 503));
    assert!(err.to_string().contains("503"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_validation_error_is_passed_through() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_string_contains("saveDataset"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"errorMessage": "bad input"})),
        )
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let data = client
        .run("mutation { saveDataset { id } }", Map::new())
        .await
        .unwrap();

    assert!(data.is_empty());
}

#[tokio::test]
async fn test_graphql_errors() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_string_contains("dataset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [
                {"message": "dataset not found", "path": ["dataset"]},
                {"message": "second"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let err = client
        .run("{ dataset(id: 1) { label } }", Map::new())
        .await
        .unwrap_err();

    match &err {
        Error::GraphQl(errors) => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].path, Some(vec![json!("dataset")]));
        }
        other => panic!("Expected GraphQl error, got {:?}", other),
    }
    assert_eq!(err.to_string(), "graphql: dataset not found");
}

#[tokio::test]
async fn test_run_as() {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Identity {
        current_user: User,
    }

    #[derive(Debug, Deserialize)]
    struct User {
        id: String,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct WrongShape {
        workspaces: Vec<String>,
    }

    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    let client = builder(&mock_server).build().await.unwrap();

    let identity: Identity = client
        .run_as("{ currentUser { id } }", Map::new())
        .await
        .unwrap();
    assert_eq!(identity.current_user.id, "1");

    let err = client
        .run_as::<WrongShape>("{ currentUser { id } }", Map::new())
        .await
        .unwrap_err();
    match err {
        Error::DeserializationFailed {
            raw_response,
            serde_error,
            ..
        } => {
            assert!(raw_response.contains("currentUser"));
            assert!(serde_error.contains("workspaces"));
        }
        other => panic!("Expected DeserializationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .and(body_json(json!({
            "user_email": "me@example.com",
            "user_password": "pw"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_key": "XYZ", "ok": true})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let key = client.login("me@example.com", "pw").await.unwrap();

    assert_eq!(key, "XYZ");
}

#[tokio::test]
async fn test_login_forbidden() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let err = client.login("me@example.com", "wrong").await.unwrap_err();

    assert!(matches!(err, Error::RequestFailed(_)));
    assert_eq!(err.to_string(), "forbidden");
}

#[tokio::test]
async fn test_login_without_key_is_rejected() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let err = client.login("me@example.com", "pw").await.unwrap_err();

    assert!(matches!(err, Error::Rejected(_)));
}

#[tokio::test]
async fn test_connect_logs_in_without_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_key": "XYZ", "ok": true})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(header("authorization", "Bearer 101 XYZ"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = ClientConfig::new("101");
    config.base_url = Some(url::Url::parse(&mock_server.uri()).unwrap());
    config.user_email = Some("me@example.com".to_string());
    config.user_password = Some(metaclient::Secret::new("pw"));

    let client = Client::connect(config).await.unwrap();
    assert!(client.transport().is_authenticated());

    let requests = mock_server.received_requests().await.unwrap();
    let login = requests
        .iter()
        .find(|r| r.url.path() == "/v1/login")
        .unwrap();
    assert!(login.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_connect_fails_when_login_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = Client::builder("101")
        .login_credentials("me@example.com", "wrong")
        .base_url(mock_server.uri())
        .unwrap()
        .build()
        .await;

    match result {
        Err(e) => assert_eq!(e.to_string(), "forbidden"),
        Ok(_) => panic!("Expected login failure"),
    }
}

#[tokio::test]
async fn test_timeout_is_retried_then_reported() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/meta"))
        .and(body_string_contains("slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(IDENTITY)
                .set_delay(Duration::from_millis(500)),
        )
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server)
        .timeout(Duration::from_millis(50))
        .build()
        .await
        .unwrap();

    let err = client.run("{ slow }", Map::new()).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_login_unauthorized() {
    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = builder(&mock_server).build().await.unwrap();
    let err = client.login("me@example.com", "pw").await.unwrap_err();

    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_login_password_is_not_traced() {
    #[derive(Default)]
    struct MemorySink(std::sync::Mutex<Vec<String>>);

    impl metaclient::TraceSink for MemorySink {
        fn record(&self, dump: &str) {
            self.0.lock().unwrap().push(dump.to_string());
        }
    }

    let mock_server = MockServer::start().await;
    mount_verify(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .and(body_json(json!({
            "user_email": "me@example.com",
            "user_password": "hunter2"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_key": "XYZ", "ok": true})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = std::sync::Arc::new(MemorySink::default());
    let client = builder(&mock_server)
        .trace_sink(sink.clone())
        .build()
        .await
        .unwrap();
    client.login("me@example.com", "hunter2").await.unwrap();

    let dumps = sink.0.lock().unwrap();
    assert!(dumps.iter().any(|d| d.starts_with("POST /v1/login HTTP/1.1")));
    assert!(dumps.iter().all(|d| !d.contains("hunter2")));
}

#[tokio::test]
async fn test_base_url_path_prefix_is_kept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/observe/v1/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_key": "XYZ", "ok": true})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/observe/v1/meta"))
        .and(header("authorization", "Bearer 101 XYZ"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IDENTITY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder("101")
        .login_credentials("me@example.com", "pw")
        .base_url(format!("{}/observe", mock_server.uri()))
        .unwrap()
        .build()
        .await
        .unwrap();

    assert_eq!(client.rpc().endpoint().path(), "/observe/v1/meta");
}
