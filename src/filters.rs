//! Assignment filters: server-side device predicates used to scope script
//! assignments down to a single device.
//!
//! | Function | API Path |
//! |----------|----------|
//! | [`new_assignment_filter`] | POST `deviceManagement/assignmentFilters` |
//! | [`delete_assignment_filter`] | DELETE `deviceManagement/assignmentFilters/{id}` |

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::client::GraphClient;
use crate::error::{IntuneError, Result};
use crate::transport::extract_id;

const FILTERS_PATH: &str = "deviceManagement/assignmentFilters";

/// Role-scope tag applied to everything this crate creates.
pub const DEFAULT_SCOPE_TAG: &str = "0";

/// Platform family every filter targets.
pub const FILTER_PLATFORM: &str = "Windows10AndLater";

/// Request body for POST `deviceManagement/assignmentFilters`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilterRequest {
    /// Fresh UUID so repeated runs never collide on name.
    pub display_name: String,
    /// Left empty.
    pub description: String,
    /// Always [`FILTER_PLATFORM`].
    pub platform: String,
    /// Device rule, e.g. `(device.deviceName -eq "LAPTOP01")`.
    pub rule: String,
    /// Always `[DEFAULT_SCOPE_TAG]`.
    pub role_scope_tag_ids: Vec<String>,
}

impl AssignmentFilterRequest {
    /// A filter that matches exactly one device by name.
    pub fn for_device_name(device_name: &str) -> Self {
        AssignmentFilterRequest {
            display_name: Uuid::new_v4().to_string(),
            description: String::new(),
            platform: FILTER_PLATFORM.to_string(),
            rule: device_name_rule(device_name),
            role_scope_tag_ids: vec![DEFAULT_SCOPE_TAG.to_string()],
        }
    }
}

/// Filter rule selecting devices whose name equals `device_name`.
///
/// Backslashes and double quotes in the name are backslash-escaped so the
/// value stays one string literal.
pub fn device_name_rule(device_name: &str) -> String {
    let escaped = device_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("(device.deviceName -eq \"{escaped}\")")
}

/// Creates a filter matching `device_name` and returns its server-assigned id.
///
/// # Errors
///
/// - `IntuneError::MissingId` — Graph answered without a top-level `id`.
/// - `IntuneError::Api` / `IntuneError::Auth` / `IntuneError::Network` —
///   the POST failed.
pub async fn new_assignment_filter(
    client: &GraphClient,
    device_name: &str,
) -> Result<Option<String>> {
    let request = AssignmentFilterRequest::for_device_name(device_name);
    info!(
        display_name = %request.display_name,
        "Creating new device assignment filter"
    );

    let Some(response) = client.transport().post(FILTERS_PATH, Some(&request)).await? else {
        return Ok(None);
    };

    let filter_id = extract_id(&response).ok_or(IntuneError::MissingId {
        resource: "assignment filter",
    })?;
    info!(filter_id = %filter_id, "Obtained filter ID");
    Ok(Some(filter_id))
}

/// Deletes an assignment filter by id.
pub async fn delete_assignment_filter(client: &GraphClient, filter_id: &str) -> Result<()> {
    info!(filter_id, "Deleting device assignment filter");
    client
        .transport()
        .delete(&format!("{FILTERS_PATH}/{filter_id}"))
        .await
}
