//! Wire transport for sync requests.

use crate::command::Method;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

/// One authenticated request to the remote peer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Value of the `Authorization` header.
    pub authorization: String,
    pub body: Option<Value>,
}

/// Carries requests to the remote peer and returns the decoded JSON body.
///
/// Any failure, including a non-2xx answer, is an error; callers treat
/// every error as "nothing happened".
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<Value>;
}

/// `Basic base64(key:secret)`
pub fn basic_auth(client_key: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_key}:{client_secret}")))
}

/// [`Transport`] over HTTP with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<Value> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|err| Error::Transport(err.to_string()))?;
        let mut builder = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::AUTHORIZATION, &request.authorization);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| Error::Protocol(format!("undecodable response body: {err}")))
    }
}
