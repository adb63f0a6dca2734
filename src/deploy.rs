//! End-to-end remediation deployment against a single device.
//!
//! The Intune flow is a strict sequence:
//! 1. Ensure a session (token installed on the transport).
//! 2. POST an assignment filter matching the device name.
//! 3. POST the script package.
//! 4. POST the assignment binding script → filter with a schedule.
//! 5. Optionally ask the device to sync so it picks the assignment up.
//!
//! Steps 2 and 3 can come back empty; the deployment then stops and whatever
//! was already created is removed again.

use tracing::{info, warn};

use crate::assignments::{RunSchedule, ScheduleKind, assign_script};
use crate::client::GraphClient;
use crate::devices::sync_device;
use crate::error::{IntuneError, Result};
use crate::filters::{delete_assignment_filter, new_assignment_filter};
use crate::scripts::{ScriptPackage, delete_script_package, new_script_package};
use crate::session::SessionState;

/// Server-side objects created by [`deploy_remediation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationDeployment {
    /// Assignment filter matching the target device.
    pub filter_id: String,
    /// Uploaded script package.
    pub script_id: String,
    /// Schedule the script was assigned with.
    pub schedule: ScheduleKind,
}

/// Runs steps 1–5 above.
///
/// Returns `Ok(None)` when Graph produced no filter or no script.
///
/// # Errors
///
/// - `IntuneError::Auth` — no session could be established.
/// - `IntuneError::InvalidArgument` — the run-once schedule cannot be
///   computed; nothing is created.
/// - Any error from the underlying filter, script, assignment, or sync call.
///   Objects created before the failing step are left in place so the
///   caller can inspect them.
pub async fn deploy_remediation(
    client: &GraphClient,
    device_name: &str,
    package: &ScriptPackage,
    schedule: ScheduleKind,
    sync_device_id: Option<&str>,
) -> Result<Option<RemediationDeployment>> {
    if client.session_state().await == SessionState::NoSession
        && client.establish_session().await?.is_none()
    {
        return Err(IntuneError::auth(
            "could not obtain an Intune access token for the deployment",
        ));
    }

    let run_schedule =
        RunSchedule::for_kind(schedule, client.now(), &client.options().schedule)?;

    let Some(filter_id) = new_assignment_filter(client, device_name).await? else {
        warn!(device_name, "No assignment filter was created");
        return Ok(None);
    };

    let Some(script_id) = new_script_package(client, package).await? else {
        warn!("No script package was created, removing filter {filter_id}");
        delete_assignment_filter(client, &filter_id).await?;
        return Ok(None);
    };

    assign_script(client, &filter_id, &script_id, run_schedule).await?;

    if let Some(device_id) = sync_device_id {
        sync_device(client, device_id).await?;
    }

    info!(
        filter_id = %filter_id,
        script_id = %script_id,
        ?schedule,
        "Remediation deployed to {device_name}"
    );
    Ok(Some(RemediationDeployment {
        filter_id,
        script_id,
        schedule,
    }))
}

/// Deletes the script package, then the filter, of a deployment.
pub async fn remove_deployment(
    client: &GraphClient,
    deployment: &RemediationDeployment,
) -> Result<()> {
    delete_script_package(client, &deployment.script_id).await?;
    delete_assignment_filter(client, &deployment.filter_id).await?;
    info!(
        filter_id = %deployment.filter_id,
        script_id = %deployment.script_id,
        "Removed remediation deployment"
    );
    Ok(())
}
