//! Async Rust client for the Intune device-management surface of
//! Microsoft Graph (beta).
//!
//! Authenticates with a delegated refresh token, then exposes the Intune
//! operations needed to push a proactive remediation to a single device:
//! device lookup (with an optional local device store), assignment filters,
//! device health script packages, script assignments, device sync, and
//! on-demand remediation.
//!
//! # Modules
//!
//! - [`assignments`] — Run-once / hourly schedules and script assignment.
//! - [`auth`] — `AuthProvider` seam and the refresh-token implementation.
//! - [`client`] — `GraphClient`: session ownership and token installation.
//! - [`config`] — Layered file + environment configuration.
//! - [`deploy`] — Filter → script → assignment → sync workflow.
//! - [`devices`] — Device query, enrolled-device listing, device actions.
//! - [`error`] — Typed error hierarchy (`IntuneError`).
//! - [`filters`] — Assignment filter create/delete.
//! - [`scripts`] — Device health script package create/delete.
//! - [`session`] — Per-client session state.
//! - [`store`] — Device store trait with memory and SQLite backends.
//! - [`transport`] — Authenticated HTTP wrapper for Graph beta.
//!
//! # Quick Start
//!
//! ```ignore
//! use intune_graph::auth::{DEFAULT_CLIENT_ID, RefreshTokenProvider};
//! use intune_graph::client::GraphClient;
//! use intune_graph::deploy::deploy_remediation;
//! use intune_graph::assignments::ScheduleKind;
//! use intune_graph::scripts::ScriptPackage;
//!
//! let auth = RefreshTokenProvider::new("tenant", DEFAULT_CLIENT_ID, "0.refresh");
//! let client = GraphClient::new(auth)?;
//! let package = ScriptPackage::new("Check", "exit 1").with_remediation_script("whoami");
//! let deployment =
//!     deploy_remediation(&client, "LAPTOP01", &package, ScheduleKind::Once, None).await?;
//! ```

#![warn(missing_docs)]

pub mod assignments;
pub mod auth;
pub mod client;
pub mod config;
pub mod deploy;
pub mod devices;
pub mod error;
pub mod filters;
pub mod scripts;
pub mod session;
pub mod store;
pub mod transport;
