//! # metaclient - GraphQL and REST client for the metadata service
//!
//! metaclient talks to a tenant's metadata service over HTTPS. Every call
//! goes through one shared [`Transport`] that attaches the customer
//! credential, traces the exchange on the wire, retries transient failures
//! with a fixed delay and classifies the status code.
//!
//! ## Quick Start
//!
//! ```no_run
//! use metaclient::Client;
//! use serde::Deserialize;
//! use serde_json::Map;
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Identity {
//!     current_user: User,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), metaclient::Error> {
//!     // Construction verifies connectivity and the credential
//!     let client = Client::builder("101")
//!         .token("my-token")
//!         .user_agent("my-tool/1.0")
//!         .build()
//!         .await?;
//!
//!     let identity: Identity = client
//!         .run_as("{ currentUser { id } }", Map::new())
//!         .await?;
//!     println!("Logged in as {}", identity.current_user.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! Configuration can also come from `OBSERVE_*` environment variables via
//! [`ClientConfig::from_env`] and [`Client::connect`].
//!
//! ## Error Handling
//!
//! ```no_run
//! use metaclient::{Client, Error};
//!
//! # async fn example(client: Client) {
//! match client.run("{ currentUser { id } }", Default::default()).await {
//!     Ok(data) => println!("{:?}", data),
//!     Err(Error::Unauthorized) => eprintln!("credential rejected"),
//!     Err(Error::GraphQl(errors)) => eprintln!("{} GraphQL errors", errors.len()),
//!     Err(e) if e.is_retryable() => eprintln!("gave up on a transient failure: {}", e),
//!     Err(e) => eprintln!("request failed: {}", e),
//! }
//! # }
//! ```
//!
//! ## Retries
//!
//! Only failures whose error chain reports a temporary condition are
//! retried; see [`classify`]. Status codes are never retried.
//!
//! ```no_run
//! use metaclient::{Client, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), metaclient::Error> {
//! let client = Client::builder("101")
//!     .token("my-token")
//!     .retry_policy(RetryPolicy::new(5, Duration::from_millis(500)))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod cancel;
pub mod classify;
mod client;
mod config;
mod error;
mod exchange;
mod graphql;
mod request;
mod response;
mod rest;
mod retry;
pub mod trace;
mod transport;

pub use cancel::CancellationToken;
pub use client::{Client, ClientBuilder, LOGIN_PATH};
pub use config::{ClientConfig, Credential, Secret, DEFAULT_DOMAIN};
pub use error::{BoxError, Error, Result};
pub use exchange::{Exchange, ReqwestExchange};
pub use graphql::{
    GraphQlError, GraphQlRequest, GraphQlResponse, ResultStatus, RpcClient, GRAPHQL_PATH,
    VERIFY_QUERY,
};
pub use request::Request;
pub use response::{Outcome, Response};
pub use rest::RestClient;
pub use retry::RetryPolicy;
pub use trace::{LogSink, TraceMode, TraceSink, Tracer};
pub use transport::{Transport, TransportBuilder};
