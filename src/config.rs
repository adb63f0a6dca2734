//! Layered configuration: optional TOML file under `INTUNE__*` environment
//! variables.
//!
//! ```toml
//! [auth]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! refresh_token = "0.AAAA..."
//!
//! [schedule]
//! run_once_delay_secs = 300
//! hourly_interval = 1
//!
//! [store]
//! path = "devices.db"
//! short_circuit_on_hit = false
//! ```
//!
//! `INTUNE__AUTH__REFRESH_TOKEN` overrides `auth.refresh_token`, and so on.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::assignments::ScheduleConfig;
use crate::auth::DEFAULT_CLIENT_ID;
use crate::client::ClientOptions;
use crate::error::{IntuneError, Result};
use crate::transport::BASE_URL;

/// Default config file name, looked up in the working directory.
const DEFAULT_FILE: &str = "intune";

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// `[auth]`
    #[serde(default)]
    pub auth: AuthSettings,
    /// `[graph]`
    #[serde(default)]
    pub graph: GraphSettings,
    /// `[schedule]`
    #[serde(default)]
    pub schedule: ScheduleSettings,
    /// `[store]`
    #[serde(default)]
    pub store: StoreSettings,
}

/// Identity used for the refresh-token grant.
#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// Azure AD tenant id.
    #[serde(default)]
    pub tenant_id: String,
    /// Public client the refresh token was issued to.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Delegated refresh token.
    #[serde(default)]
    pub refresh_token: String,
    /// Token endpoint override; `{tenant_id}` is substituted.
    #[serde(default)]
    pub token_url: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            tenant_id: String::new(),
            client_id: default_client_id(),
            refresh_token: String::new(),
            token_url: None,
        }
    }
}

/// Graph endpoint settings.
#[derive(Debug, Deserialize)]
pub struct GraphSettings {
    /// Graph beta root; tests and sovereign clouds override it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        GraphSettings {
            base_url: default_base_url(),
        }
    }
}

/// Assignment schedule constants.
#[derive(Debug, Deserialize)]
pub struct ScheduleSettings {
    /// Seconds between "now" and a run-once start. Must not be negative.
    #[serde(default = "default_run_once_delay_secs")]
    pub run_once_delay_secs: i64,
    /// Hours between hourly runs. Must be at least 1.
    #[serde(default = "default_hourly_interval")]
    pub hourly_interval: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            run_once_delay_secs: default_run_once_delay_secs(),
            hourly_interval: default_hourly_interval(),
        }
    }
}

/// Device store settings.
#[derive(Debug, Default, Deserialize)]
pub struct StoreSettings {
    /// SQLite database file. Without one, devices are kept in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Return a stored device instead of re-fetching it.
    #[serde(default)]
    pub short_circuit_on_hit: bool,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_run_once_delay_secs() -> i64 {
    300
}

fn default_hourly_interval() -> u32 {
    1
}

impl AppConfig {
    /// Loads `path` (required) or `./intune.toml` (optional), then applies
    /// `INTUNE__` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("INTUNE").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Client options derived from the `[schedule]` and `[store]` sections.
    ///
    /// # Errors
    ///
    /// `IntuneError::Config` when the run-once delay is negative or not
    /// representable, or the hourly interval is zero.
    pub fn client_options(&self) -> Result<ClientOptions> {
        let secs = self.schedule.run_once_delay_secs;
        if secs < 0 {
            return Err(invalid(format!(
                "schedule.run_once_delay_secs must not be negative, got {secs}"
            )));
        }
        let run_once_delay = TimeDelta::try_seconds(secs).ok_or_else(|| {
            invalid(format!("schedule.run_once_delay_secs is out of range: {secs}"))
        })?;
        if self.schedule.hourly_interval == 0 {
            return Err(invalid(
                "schedule.hourly_interval must be at least 1".to_string(),
            ));
        }

        Ok(ClientOptions {
            schedule: ScheduleConfig {
                run_once_delay,
                hourly_interval: self.schedule.hourly_interval,
            },
            short_circuit_cached_devices: self.store.short_circuit_on_hit,
        })
    }
}

fn invalid(message: String) -> IntuneError {
    IntuneError::Config(ConfigError::Message(message))
}
