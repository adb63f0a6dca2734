//! Token acquisition for the Intune management API.
//!
//! [`AuthProvider`] is the seam between the Graph client and whatever
//! identity flow produced the tenant id and refresh token. The client only
//! ever asks two things of it: "(re)resolve your tenant and refresh token"
//! and "exchange them for an access token scoped to this resource".
//!
//! [`RefreshTokenProvider`] is the bundled implementation. It performs the
//! OAuth2 `refresh_token` grant against Azure AD's `/oauth2/v2.0/token`
//! endpoint and keeps any rotated refresh token the endpoint hands back, so
//! the next `resolve_tenant_and_refresh_token()` picks it up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::error::{IntuneError, Result};

/// Azure AD v2.0 token endpoint. `{tenant_id}` is replaced at runtime.
const TOKEN_URL: &str = "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token";

/// Public client id of the Microsoft Intune PowerShell application.
pub const DEFAULT_CLIENT_ID: &str = "d1ddf0e4-d672-4dae-b554-9d5bdfd93547";

/// The resource/scope triple an access token is requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenScope {
    /// Resource the delegation token is minted for.
    pub resource_url: &'static str,
    /// Portal extension requesting the token.
    pub client_scope: &'static str,
    /// Downstream API the token must be valid for.
    pub api_scope: &'static str,
}

/// Scope used for every Intune Graph call.
pub const INTUNE_SCOPE: TokenScope = TokenScope {
    resource_url: "https://intune.microsoft.com/api/DelegationToken",
    client_scope: "Microsoft_Intune_DeviceSettings",
    api_scope: "microsoft.graph",
};

impl TokenScope {
    /// OAuth2 `scope` parameter for the token request.
    ///
    /// `microsoft.graph` maps to Graph's `.default` scope; anything else is
    /// treated as a resource URI.
    pub fn oauth_scope(&self) -> String {
        match self.api_scope {
            "microsoft.graph" => "https://graph.microsoft.com/.default offline_access".to_string(),
            other => format!("{}/.default offline_access", other.trim_end_matches('/')),
        }
    }
}

/// Source of tenant identity and access tokens.
///
/// Implementations use interior mutability: `resolve_tenant_and_refresh_token`
/// updates provider-held state that `tenant_id()` / `refresh_token()` read
/// back afterwards.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Re-resolves the tenant id and refresh token.
    async fn resolve_tenant_and_refresh_token(&self) -> Result<()>;

    /// Tenant id resolved by the last `resolve_tenant_and_refresh_token` call.
    fn tenant_id(&self) -> Option<String>;

    /// Refresh token resolved by the last `resolve_tenant_and_refresh_token` call.
    fn refresh_token(&self) -> Option<String>;

    /// Exchanges a refresh token for an access token scoped to `scope`.
    ///
    /// Returns `Ok(None)` when the identity service declined to issue a
    /// token. `Err` is reserved for failures reaching it at all.
    async fn get_access_token(
        &self,
        tenant_id: &str,
        refresh_token: &str,
        scope: &TokenScope,
    ) -> Result<Option<String>>;
}

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    client_id: &'a str,
    grant_type: &'a str,
    refresh_token: &'a str,
    scope: &'a str,
}

/// Subset of the Azure AD token response that we need.
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Bearer token for Graph.
    pub access_token: String,
    /// Usually `Bearer`.
    pub token_type: String,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
    /// Present when Azure AD rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Default)]
struct Credentials {
    tenant_id: Option<String>,
    refresh_token: Option<String>,
    rotated: Option<String>,
}

/// OAuth2 refresh-token grant against Azure AD.
pub struct RefreshTokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    credentials: Mutex<Credentials>,
    preset: Option<String>,
}

impl RefreshTokenProvider {
    /// Provider for `tenant_id` using the public client `client_id`. Empty
    /// strings count as missing credentials.
    pub fn new(tenant_id: &str, client_id: &str, refresh_token: &str) -> Self {
        RefreshTokenProvider {
            client: reqwest::Client::new(),
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            credentials: Mutex::new(Credentials {
                tenant_id: Some(tenant_id.to_string()).filter(|t| !t.is_empty()),
                refresh_token: Some(refresh_token.to_string()).filter(|t| !t.is_empty()),
                rotated: None,
            }),
            preset: None,
        }
    }

    /// Creates a provider that hands out `token` without contacting Azure AD.
    /// Used by tests to keep token acquisition off the network.
    pub fn with_token(token: &str) -> Self {
        RefreshTokenProvider {
            client: reqwest::Client::new(),
            token_url: TOKEN_URL.to_string(),
            client_id: String::new(),
            credentials: Mutex::new(Credentials {
                tenant_id: Some("preset-tenant".to_string()),
                refresh_token: Some("preset-refresh-token".to_string()),
                rotated: None,
            }),
            preset: Some(token.to_string()),
        }
    }

    /// Overrides the token endpoint template (`{tenant_id}` is still
    /// substituted). Tests point this at a mock server.
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    fn credentials(&self) -> std::sync::MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuthProvider for RefreshTokenProvider {
    async fn resolve_tenant_and_refresh_token(&self) -> Result<()> {
        let mut creds = self.credentials();
        if let Some(rotated) = creds.rotated.take() {
            debug!("Using rotated refresh token from previous exchange");
            creds.refresh_token = Some(rotated);
        }

        match (&creds.tenant_id, &creds.refresh_token) {
            (Some(tenant_id), Some(_)) => {
                debug!(tenant_id = %tenant_id, "Resolved tenant id and refresh token");
                Ok(())
            }
            (None, _) => Err(IntuneError::auth("no tenant id configured")),
            (_, None) => Err(IntuneError::auth("no refresh token configured")),
        }
    }

    fn tenant_id(&self) -> Option<String> {
        self.credentials().tenant_id.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.credentials().refresh_token.clone()
    }

    async fn get_access_token(
        &self,
        tenant_id: &str,
        refresh_token: &str,
        scope: &TokenScope,
    ) -> Result<Option<String>> {
        if let Some(token) = &self.preset {
            return Ok(Some(token.clone()));
        }

        let oauth_scope = scope.oauth_scope();
        let body = TokenRequest {
            client_id: &self.client_id,
            grant_type: "refresh_token",
            refresh_token,
            scope: &oauth_scope,
        };
        let url = self.token_url.replace("{tenant_id}", tenant_id);
        debug!(resource = scope.resource_url, "Requesting access token from {url}");

        let response = self
            .client
            .post(&url)
            .form(&body)
            .send()
            .await
            .map_err(|e| IntuneError::Auth {
                message: format!("token endpoint unreachable: {url}"),
                source: Some(Box::new(e)),
            })?;

        // Read body before checking status so the AADSTS code survives.
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%status, body = %body, "Token endpoint declined to issue a token");
            return Ok(None);
        }

        let resp: TokenResponse = serde_json::from_str(&body).map_err(|e| IntuneError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(e)),
        })?;

        if let Some(rotated) = resp.refresh_token {
            self.credentials().rotated = Some(rotated);
        }
        info!(
            token_type = %resp.token_type,
            expires_in = resp.expires_in,
            "Obtained access token for {}",
            scope.api_scope
        );
        Ok(Some(resp.access_token))
    }
}
