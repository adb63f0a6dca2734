//! Integration tests for session establishment and token exchange.
//!
//! Two layers are exercised against wiremock:
//!
//! - `RefreshTokenProvider` talking to a mocked Azure AD token endpoint
//! - `GraphClient` session lifecycle with providers that do or do not issue
//!   a token, including the guarantee that no Graph request is sent when
//!   no token could be obtained.

use async_trait::async_trait;
use intune_graph::auth::{AuthProvider, DEFAULT_CLIENT_ID, RefreshTokenProvider, TokenScope};
use intune_graph::client::GraphClient;
use intune_graph::devices::{get_devices, list_enrolled_devices};
use intune_graph::error::{IntuneError, Result};
use intune_graph::session::SessionState;
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_url(server: &MockServer) -> String {
    format!("{}/{{tenant_id}}/oauth2/v2.0/token", server.uri())
}

fn graph_url(server: &MockServer) -> String {
    format!("{}/beta/", server.uri())
}

/// Provider that resolves an identity but is always refused a token.
struct RefusingProvider;

#[async_trait]
impl AuthProvider for RefusingProvider {
    async fn resolve_tenant_and_refresh_token(&self) -> Result<()> {
        Ok(())
    }

    fn tenant_id(&self) -> Option<String> {
        Some("tenant-1".to_string())
    }

    fn refresh_token(&self) -> Option<String> {
        Some("0.refresh".to_string())
    }

    async fn get_access_token(
        &self,
        _tenant_id: &str,
        _refresh_token: &str,
        _scope: &TokenScope,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

// ── RefreshTokenProvider ───────────────────────────────────────────────

#[tokio::test]
async fn refresh_grant_posts_form_to_tenant_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=0.original"))
        .and(body_string_contains(DEFAULT_CLIENT_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "graph-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new("tenant-1", DEFAULT_CLIENT_ID, "0.original")
        .with_token_url(&token_url(&server));
    let client = GraphClient::with_base_url(provider, &graph_url(&server)).unwrap();

    let token = client.establish_session().await.unwrap();

    assert_eq!(token.as_deref(), Some("graph-token"));
    assert_eq!(client.session_state().await, SessionState::Authenticated);
    assert!(client.transport().has_authorization().await);
}

#[tokio::test]
async fn rotated_refresh_token_is_used_on_next_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("refresh_token=0.original"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "first",
            "refresh_token": "0.rotated"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("refresh_token=0.rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "second"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new("tenant-1", DEFAULT_CLIENT_ID, "0.original")
        .with_token_url(&token_url(&server));
    let client = GraphClient::with_base_url(provider, &graph_url(&server)).unwrap();

    assert_eq!(client.establish_session().await.unwrap().as_deref(), Some("first"));
    assert_eq!(client.establish_session().await.unwrap().as_deref(), Some("second"));

    let session = client.session().await;
    assert_eq!(session.refresh_token(), Some("0.rotated"));
    assert_eq!(session.access_token(), Some("second"));
}

#[tokio::test]
async fn token_endpoint_rejection_leaves_session_empty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"/oauth2/v2\.0/token$"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70000: The provided grant is invalid or malformed."
        })))
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new("tenant-1", DEFAULT_CLIENT_ID, "0.expired")
        .with_token_url(&token_url(&server));
    let client = GraphClient::with_base_url(provider, &graph_url(&server)).unwrap();

    let token = client.establish_session().await.unwrap();

    assert!(token.is_none(), "a refused grant is not an error");
    assert_eq!(client.session_state().await, SessionState::NoSession);
    assert!(!client.transport().has_authorization().await);
    assert_eq!(client.session().await.tenant_id(), Some("tenant-1"));
}

#[tokio::test]
async fn acquire_token_uses_the_given_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/other-tenant/oauth2/v2.0/token"))
        .and(body_string_contains("refresh_token=0.portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "portal-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new("tenant-1", DEFAULT_CLIENT_ID, "0.original")
        .with_token_url(&token_url(&server));
    let client = GraphClient::with_base_url(provider, &graph_url(&server)).unwrap();

    let token = client.acquire_token("other-tenant", "0.portal").await.unwrap();
    assert_eq!(token.as_deref(), Some("portal-token"));
    assert_eq!(client.access_token().await.as_deref(), Some("portal-token"));
}

// ── Session guarantees on Graph calls ──────────────────────────────────

#[tokio::test]
async fn device_query_without_token_sends_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/beta/me/managedDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(0)
        .mount(&server)
        .await;

    let client = GraphClient::with_base_url(RefusingProvider, &graph_url(&server)).unwrap();

    let err = get_devices(&client, Some("d-1"), None, None).await.unwrap_err();

    assert!(matches!(err, IntuneError::Auth { .. }), "got {err:?}");
    assert_eq!(client.session_state().await, SessionState::NoSession);
}

#[tokio::test]
async fn protected_call_before_any_session_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/beta/me/managedDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&server)
        .await;

    let client =
        GraphClient::with_base_url(RefreshTokenProvider::with_token("tok"), &graph_url(&server))
            .unwrap();

    let err = list_enrolled_devices(&client).await.unwrap_err();
    assert!(matches!(err, IntuneError::Auth { .. }), "got {err:?}");
}
