//! Managed device lookup and device actions.
//!
//! This module covers the device side of the Intune surface:
//!
//! - [`get_devices`] — filtered device query with optional store caching.
//! - [`list_enrolled_devices`] — the raw, unfiltered device collection.
//! - [`sync_device`] — ask a device to check in with Intune.
//! - [`trigger_remediation`] — on-demand proactive remediation.
//!
//! Device records are kept as untyped property bags ([`ManagedDevice`]):
//! the Graph beta schema for `managedDevice` is large and changes without
//! notice, and nothing in this crate needs more than the primary key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::client::GraphClient;
use crate::error::{IntuneError, Result};
use crate::store::DeviceStore;
use crate::transport::json_content;

// ── Device record ──────────────────────────────────────────────────────

/// A device as returned by Graph: every field copied verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedDevice {
    properties: Map<String, Value>,
}

impl ManagedDevice {
    /// Primary key used for store lookups and upserts.
    pub const KEY_FIELD: &'static str = "Id";

    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any previous value.
    pub fn add_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The record's primary key.
    ///
    /// Reads `Id`, falling back to Graph's own lowercase `id` so records
    /// straight from the API are keyed too.
    pub fn id(&self) -> Option<&str> {
        self.properties
            .get(Self::KEY_FIELD)
            .or_else(|| self.properties.get("id"))
            .and_then(Value::as_str)
    }

    /// All fields in key order.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Consumes the record, returning its fields.
    pub fn into_properties(self) -> Map<String, Value> {
        self.properties
    }
}

impl From<Map<String, Value>> for ManagedDevice {
    fn from(properties: Map<String, Value>) -> Self {
        ManagedDevice { properties }
    }
}

impl fmt::Display for ManagedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.properties {
            match value {
                Value::String(s) => writeln!(f, "{key}: {s}")?,
                other => writeln!(f, "{key}: {other}")?,
            }
        }
        Ok(())
    }
}

// ── Query construction ─────────────────────────────────────────────────

/// Which devices a [`get_devices`] call asks Graph for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceQuery {
    /// `deviceId eq '<id>'`
    ById(String),
    /// `deviceName eq '<name>'`
    ByName(String),
    /// No filter; every managed device of the signed-in user.
    All,
}

impl DeviceQuery {
    /// Picks the predicate from optional inputs. Empty strings count as
    /// absent, and an id wins over a name when both are given.
    pub fn from_inputs(device_id: Option<&str>, device_name: Option<&str>) -> Self {
        match (
            device_id.filter(|s| !s.is_empty()),
            device_name.filter(|s| !s.is_empty()),
        ) {
            (Some(id), _) => DeviceQuery::ById(id.to_string()),
            (None, Some(name)) => DeviceQuery::ByName(name.to_string()),
            (None, None) => DeviceQuery::All,
        }
    }

    /// OData predicate, or `None` for the unfiltered collection.
    pub fn predicate(&self) -> Option<String> {
        match self {
            DeviceQuery::ById(id) => Some(format!("deviceId eq '{}'", odata_literal(id))),
            DeviceQuery::ByName(name) => {
                Some(format!("deviceName eq '{}'", odata_literal(name)))
            }
            DeviceQuery::All => None,
        }
    }

    /// Request path relative to the Graph beta root.
    pub fn path(&self) -> String {
        match self.predicate() {
            Some(predicate) => format!(
                "me/managedDevices?filter={}",
                urlencoding::encode(&predicate)
            ),
            None => "me/managedDevices".to_string(),
        }
    }

    fn label(&self) -> &str {
        match self {
            DeviceQuery::ById(v) | DeviceQuery::ByName(v) => v,
            DeviceQuery::All => "all devices",
        }
    }
}

/// Escapes a value for use inside a single-quoted OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Turns a `managedDevices` collection body into device records, in
/// response order. A missing, null, or empty `value` yields no devices.
pub fn parse_device_collection(body: &str) -> Result<Vec<ManagedDevice>> {
    let response: Map<String, Value> = serde_json::from_str(body)?;
    let records = match response.get("value") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(records)) => records,
        Some(other) => {
            return Err(IntuneError::UnexpectedResponse(format!(
                "`value` is not an array: {other}"
            )));
        }
    };

    records
        .iter()
        .map(|record| match record {
            Value::Object(fields) => {
                let mut device = ManagedDevice::new();
                for (key, value) in fields {
                    device.add_property(key.clone(), value.clone());
                }
                Ok(device)
            }
            other => Err(IntuneError::UnexpectedResponse(format!(
                "device record is not an object: {other}"
            ))),
        })
        .collect()
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Queries Intune for devices by id, by name, or unfiltered.
///
/// With a `store`, a known `device_id` is looked up first and reported when
/// found. The device is still fetched from Graph afterwards unless the
/// client was built with `short_circuit_cached_devices`. Every fetched
/// device is upserted into the store, in response order.
///
/// The session is always re-established before the fetch.
///
/// # Errors
///
/// - `IntuneError::Auth` — no token could be obtained; no GET is sent.
/// - `IntuneError::Api` / `IntuneError::Network` — the GET failed.
/// - `IntuneError::Parse` / `IntuneError::UnexpectedResponse` — the body is
///   not a device collection.
/// - `IntuneError::Store` — the store rejected an upsert.
pub async fn get_devices(
    client: &GraphClient,
    device_id: Option<&str>,
    device_name: Option<&str>,
    store: Option<&dyn DeviceStore>,
) -> Result<Vec<ManagedDevice>> {
    let query = DeviceQuery::from_inputs(device_id, device_name);
    info!("Querying information for: {}", query.label());

    if let (Some(store), DeviceQuery::ById(id)) = (store, &query) {
        match store.get_by_property(ManagedDevice::KEY_FIELD, id)? {
            Some(cached) => {
                info!(device_id = %id, "Found device in store:\n{cached}");
                if client.options().short_circuit_cached_devices {
                    return Ok(vec![cached]);
                }
            }
            None => info!("No matching device found in store, requesting from Intune"),
        }
    }

    if client.establish_session().await?.is_none() {
        return Err(IntuneError::auth(
            "could not obtain an Intune access token for the device query",
        ));
    }

    let body = client.transport().get(&query.path()).await?;
    let devices = parse_device_collection(&body)?;

    if devices.is_empty() {
        info!("No devices found.");
        return Ok(devices);
    }

    for device in &devices {
        debug!(device_id = device.id().unwrap_or_default(), "Received device");
        if let Some(store) = store {
            let outcome = store.upsert(device)?;
            debug!(?outcome, "Stored device");
        }
    }
    info!(count = devices.len(), "Retrieved devices from Intune");
    Ok(devices)
}

/// Returns the full enrolled-device collection as raw JSON.
///
/// Uses whatever token is already installed; the session is not
/// re-established.
pub async fn list_enrolled_devices(client: &GraphClient) -> Result<String> {
    info!("Requesting list of devices enrolled in Intune");
    client.transport().get("me/managedDevices").await
}

/// Asks a device to check in and pull pending actions and policies.
pub async fn sync_device(client: &GraphClient, device_id: &str) -> Result<()> {
    info!(device_id, "Requesting device sync with Intune");
    let path = format!("deviceManagement/managedDevices('{device_id}')/syncDevice");
    client.transport().post::<()>(&path, None).await?;
    Ok(())
}

/// Starts an on-demand proactive remediation run on a device.
///
/// The `ScriptPolicyId` body is built but not sent: the request goes out
/// without a body, matching the observed behavior of the tool this client
/// replaces.
pub async fn trigger_remediation(
    client: &GraphClient,
    device_id: &str,
    script_id: &str,
) -> Result<()> {
    info!(device_id, script_id, "Initiating on-demand proactive remediation");
    let path = format!(
        "deviceManagement/managedDevices('{device_id}')/initiateOnDemandProactiveRemediation"
    );
    let content = json_content(&serde_json::json!({ "ScriptPolicyId": script_id }))?;
    debug!(%content, "Remediation body built (not attached)");
    client.transport().post::<()>(&path, None).await?;
    Ok(())
}
