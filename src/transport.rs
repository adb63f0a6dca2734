//! Authenticated HTTP transport for the Microsoft Graph beta endpoint.
//!
//! `GraphTransport` wraps a `reqwest::Client` and the bearer token installed
//! by the session layer. It knows nothing about Intune resources: callers hand
//! it a path relative to the base URL and get the raw response text back.
//!
//! Token handling:
//! - The bearer is written only through [`GraphTransport::set_authorization`].
//! - A request issued before any token is installed fails with
//!   `IntuneError::Auth` without touching the network.
//! - There is no retry of any kind, including on 401.

use reqwest::tls::Version;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{IntuneError, Result};

/// Graph beta root. Every Intune endpoint used by this crate lives under it.
pub const BASE_URL: &str = "https://graph.microsoft.com/beta/";

/// Covers TCP + TLS handshake only.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full round-trip including body download.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .min_tls_version(Version::TLS_1_2)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Serializes an arbitrary field set into a JSON request body.
pub fn json_content<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(body)?)
}

/// Returns the top-level `id` of a JSON response body.
///
/// Yields `None` when the body is not a JSON object or has no non-empty
/// string `id` at the top level. Nested `id` fields are never considered.
pub fn extract_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("id")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// HTTP transport for Graph.
///
/// `base_url` is a `String` so tests can point it at a wiremock server.
/// The bearer lives behind an async `RwLock`; it is read once per request and
/// the lock is released before the request is sent.
pub struct GraphTransport {
    client: Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
}

impl GraphTransport {
    /// Transport for the public Graph beta endpoint.
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    /// Constructor that accepts a custom base URL, used by tests to point
    /// at a local mock server instead of Graph.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(GraphTransport {
            client: build_client()?,
            base_url,
            bearer: RwLock::new(None),
        })
    }

    /// Base URL with a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Installs `token` as the bearer for every subsequent request.
    pub async fn set_authorization(&self, token: &str) {
        *self.bearer.write().await = Some(token.to_string());
    }

    /// Whether a bearer token has been installed.
    pub async fn has_authorization(&self) -> bool {
        self.bearer.read().await.is_some()
    }

    async fn bearer_token(&self) -> Result<String> {
        self.bearer
            .read()
            .await
            .clone()
            .ok_or_else(|| IntuneError::auth("no access token installed on the transport"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Builds the request, sends it, and returns the body text of a 2xx
    /// response. The body is read before the status is checked so that
    /// Graph's error payload is preserved in `IntuneError::Api`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String> {
        let token = self.bearer_token().await?;
        let url = self.url(path);
        debug!(%method, %url, "Sending Graph request");

        let resp = self.build_request(method, &url, &token, body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(IntuneError::Api { status, body: text });
        }
        Ok(text)
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> RequestBuilder {
        let is_post = method == Method::POST;
        let req = self.client.request(method, url).bearer_auth(token);
        match body {
            Some(payload) => req.json(&payload),
            // Graph rejects body-less POSTs that omit Content-Length.
            None if is_post => req.header(reqwest::header::CONTENT_LENGTH, 0),
            None => req,
        }
    }

    /// Sends a GET and returns the raw response body.
    pub async fn get(&self, path: &str) -> Result<String> {
        self.send(Method::GET, path, None).await
    }

    /// Sends a POST with an optional JSON body.
    ///
    /// Returns `Ok(None)` when the response carries no body (e.g. 204 from
    /// action endpoints), otherwise the raw body text.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<String>> {
        let payload = body.map(json_content).transpose()?;
        let text = self.send(Method::POST, path, payload).await?;
        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }

    /// Sends a DELETE. Any response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await.map(|_| ())
    }
}
