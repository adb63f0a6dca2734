//! The Intune Graph client: session ownership and token installation.
//!
//! `GraphClient` ties together an [`AuthProvider`], the [`GraphTransport`] and
//! the per-client [`Session`]. Resource operations live in their own modules
//! (`devices`, `filters`, `scripts`, `assignments`) as free functions taking
//! `&GraphClient`, the same way every endpoint family is laid out.
//!
//! Session lifecycle:
//! - A new client holds no token (`SessionState::NoSession`).
//! - [`GraphClient::establish_session`] re-resolves the tenant and refresh
//!   token, then calls [`GraphClient::acquire_token`], which installs the
//!   token on the transport and records it in the session.
//! - Nothing re-authenticates on its own. Only the device query path
//!   re-runs `establish_session`; every other operation relies on a token
//!   installed earlier, and fails with `IntuneError::Auth` if there is none.
//!
//! One client is one logical session. Concurrent callers racing on
//! `establish_session` must serialize externally.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::assignments::{Clock, ScheduleConfig, SystemClock};
use crate::auth::{AuthProvider, INTUNE_SCOPE};
use crate::error::Result;
use crate::session::{Session, SessionState};
use crate::transport::GraphTransport;

/// Behavioral knobs for a [`GraphClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Run-once delay and hourly interval used by the assignment endpoints.
    pub schedule: ScheduleConfig,
    /// When set, a device query whose `Id` is already in the store returns
    /// the stored record and skips the Graph round trip. Off by default:
    /// the store hit is only reported and the device is always re-fetched.
    pub short_circuit_cached_devices: bool,
}

/// Client for the Intune surface of Microsoft Graph.
pub struct GraphClient {
    transport: GraphTransport,
    auth: Box<dyn AuthProvider>,
    session: Mutex<Session>,
    options: ClientOptions,
    clock: Box<dyn Clock>,
}

impl GraphClient {
    /// Client against the production Graph beta endpoint.
    pub fn new(auth: impl AuthProvider + 'static) -> Result<Self> {
        Ok(Self::from_parts(Box::new(auth), GraphTransport::new()?))
    }

    /// Constructor that accepts a custom base URL, used by tests to point
    /// at a local mock server instead of Graph.
    pub fn with_base_url(auth: impl AuthProvider + 'static, base_url: &str) -> Result<Self> {
        Ok(Self::from_parts(
            Box::new(auth),
            GraphTransport::with_base_url(base_url)?,
        ))
    }

    /// Assembles a client from an auth provider and a prepared transport.
    pub fn from_parts(auth: Box<dyn AuthProvider>, transport: GraphTransport) -> Self {
        GraphClient {
            transport,
            auth,
            session: Mutex::new(Session::new()),
            options: ClientOptions::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// Replaces the default [`ClientOptions`].
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the wall clock used for schedule computation.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The underlying HTTP transport.
    pub fn transport(&self) -> &GraphTransport {
        &self.transport
    }

    /// Options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current time according to the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// State of the session without cloning it.
    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// The installed access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.session.lock().await.access_token().map(str::to_owned)
    }

    /// Snapshot of the current session.
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Requests an Intune-scoped access token and installs it.
    ///
    /// `portal_authorization` is the refresh credential handed to the
    /// provider. When the provider issues no token the session and transport
    /// are left untouched and `Ok(None)` is returned; callers must check.
    pub async fn acquire_token(
        &self,
        tenant_id: &str,
        portal_authorization: &str,
    ) -> Result<Option<String>> {
        info!(tenant_id, "Requesting Intune access token");
        let token = self
            .auth
            .get_access_token(tenant_id, portal_authorization, &INTUNE_SCOPE)
            .await?;

        let Some(token) = token else {
            warn!(tenant_id, "No Intune access token was issued");
            return Ok(None);
        };

        self.transport.set_authorization(&token).await;
        self.session.lock().await.set_access_token(token.clone());
        Ok(Some(token))
    }

    /// Re-resolves the tenant and refresh token, then acquires a token.
    ///
    /// The transport always negotiates TLS 1.2 or newer; that is fixed when
    /// it is built, so nothing needs to be renegotiated here.
    pub async fn establish_session(&self) -> Result<Option<String>> {
        self.auth.resolve_tenant_and_refresh_token().await?;
        let tenant_id = self.auth.tenant_id();
        let refresh_token = self.auth.refresh_token();
        self.session
            .lock()
            .await
            .set_identity(tenant_id.clone(), refresh_token.clone());

        match (tenant_id, refresh_token) {
            (Some(tenant_id), Some(refresh_token)) => {
                self.acquire_token(&tenant_id, &refresh_token).await
            }
            _ => {
                warn!("Auth provider resolved no tenant id or refresh token");
                Ok(None)
            }
        }
    }
}
