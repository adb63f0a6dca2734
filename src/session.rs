//! Per-client authentication state.
//!
//! A `Session` is owned by exactly one [`GraphClient`](crate::client::GraphClient)
//! and lives for the process run only; nothing here is persisted. There is no
//! expiry tracking: callers re-establish the session before a sequence of
//! protected calls that needs a fresh token.

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No access token has been installed yet.
    NoSession,
    /// An access token is held and installed on the transport.
    Authenticated,
}

/// Tenant/refresh-token pair and the access token minted from it.
#[derive(Debug, Default, Clone)]
pub struct Session {
    access_token: Option<String>,
    tenant_id: Option<String>,
    refresh_token: Option<String>,
}

impl Session {
    /// A session with no credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Authenticated` once an access token is held.
    pub fn state(&self) -> SessionState {
        match self.access_token {
            Some(_) => SessionState::Authenticated,
            None => SessionState::NoSession,
        }
    }

    /// Current access token.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Tenant the token was minted for.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Refresh token, as last rotated.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub(crate) fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
    }

    pub(crate) fn set_identity(
        &mut self,
        tenant_id: Option<String>,
        refresh_token: Option<String>,
    ) {
        self.tenant_id = tenant_id;
        self.refresh_token = refresh_token;
    }
}
