//! Scheduling a script package against an assignment filter.
//!
//! An assignment targets "all devices", narrowed by one filter in include
//! mode, and carries a run schedule:
//!
//! - **run-once** — a single run at `now + run_once_delay` (UTC). The delay
//!   leaves the device time to finish a management sync before the run.
//! - **hourly** — recurring every `hourly_interval` hours, no start time.
//!
//! Both variants POST to `deviceManagement/deviceHealthScripts/{id}/assign`.
//! The response body is not inspected.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::info;

use crate::client::GraphClient;
use crate::error::{IntuneError, Result};
use crate::scripts::SCRIPTS_PATH;

// ── Clock ──────────────────────────────────────────────────────────────

/// Source of "now" for schedule computation.
pub trait Clock: Send + Sync {
    /// The current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ── Schedule ───────────────────────────────────────────────────────────

/// Tunable schedule constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Offset from "now" for run-once schedules.
    pub run_once_delay: TimeDelta,
    /// Interval for hourly schedules, in hours.
    pub hourly_interval: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            run_once_delay: TimeDelta::minutes(5),
            hourly_interval: 1,
        }
    }
}

/// Which kind of schedule to attach to an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// A single run shortly after assignment.
    Once,
    /// A recurring run every `hourly_interval` hours.
    Hourly,
}

/// `runSchedule` payload, tagged with its Graph `@odata.type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@odata.type")]
pub enum RunSchedule {
    /// Single run at a fixed UTC date and time.
    #[serde(
        rename = "#microsoft.graph.deviceHealthScriptRunOnceSchedule",
        rename_all = "camelCase"
    )]
    RunOnce {
        /// Always 1.
        interval: u32,
        /// `yyyy-MM-dd`
        date: String,
        /// `HH:mm:ss`
        time: String,
        /// Interpret `date`/`time` as UTC rather than device-local.
        use_utc: bool,
    },
    /// Recurring run.
    #[serde(rename = "#microsoft.graph.deviceHealthScriptHourlySchedule")]
    Hourly {
        /// Hours between runs.
        interval: u32,
    },
}

impl RunSchedule {
    /// A single UTC run at `now + config.run_once_delay`.
    ///
    /// # Errors
    ///
    /// `IntuneError::InvalidArgument` when the delay is negative or the start
    /// falls outside chrono's representable range.
    pub fn run_once(now: DateTime<Utc>, config: &ScheduleConfig) -> Result<Self> {
        if config.run_once_delay < TimeDelta::zero() {
            return Err(IntuneError::InvalidArgument(format!(
                "run-once delay must not be negative, got {}",
                config.run_once_delay
            )));
        }
        let start = now.checked_add_signed(config.run_once_delay).ok_or_else(|| {
            IntuneError::InvalidArgument(format!(
                "run-once delay {} overflows the schedule date",
                config.run_once_delay
            ))
        })?;
        Ok(RunSchedule::RunOnce {
            interval: 1,
            date: start.format("%Y-%m-%d").to_string(),
            time: start.format("%H:%M:%S").to_string(),
            use_utc: true,
        })
    }

    /// A recurring run every `config.hourly_interval` hours.
    pub fn hourly(config: &ScheduleConfig) -> Self {
        RunSchedule::Hourly {
            interval: config.hourly_interval,
        }
    }

    /// Builds the schedule for `kind`.
    pub fn for_kind(
        kind: ScheduleKind,
        now: DateTime<Utc>,
        config: &ScheduleConfig,
    ) -> Result<Self> {
        match kind {
            ScheduleKind::Once => Self::run_once(now, config),
            ScheduleKind::Hourly => Ok(Self::hourly(config)),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────────

/// How the filter narrows the target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only devices matching the filter.
    Include,
    /// Every device except those matching the filter.
    Exclude,
}

/// Who an assignment applies to.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentTarget {
    /// Graph target type.
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    /// Assignment filter narrowing the target.
    #[serde(rename = "deviceAndAppManagementAssignmentFilterId")]
    pub filter_id: String,
    /// Whether the filter includes or excludes matches.
    #[serde(rename = "deviceAndAppManagementAssignmentFilterType")]
    pub filter_mode: FilterMode,
}

impl AssignmentTarget {
    /// All devices, narrowed to those matched by `filter_id`.
    pub fn all_devices_including(filter_id: &str) -> Self {
        AssignmentTarget {
            odata_type: "#microsoft.graph.allDevicesAssignmentTarget",
            filter_id: filter_id.to_string(),
            filter_mode: FilterMode::Include,
        }
    }
}

/// One entry of `deviceHealthScriptAssignments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAssignment {
    /// Devices the script runs on.
    pub target: AssignmentTarget,
    /// Run the remediation script when detection reports an issue.
    pub run_remediation_script: bool,
    /// When the script runs.
    pub run_schedule: RunSchedule,
}

/// Request body for POST `.../deviceHealthScripts/{id}/assign`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    /// Always exactly one assignment.
    pub device_health_script_assignments: Vec<ScriptAssignment>,
}

impl AssignRequest {
    /// One remediating assignment through `filter_id` on `schedule`.
    pub fn new(filter_id: &str, schedule: RunSchedule) -> Self {
        AssignRequest {
            device_health_script_assignments: vec![ScriptAssignment {
                target: AssignmentTarget::all_devices_including(filter_id),
                run_remediation_script: true,
                run_schedule: schedule,
            }],
        }
    }
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Assigns `script_id` to the devices matched by `filter_id`.
///
/// # Errors
///
/// - `IntuneError::InvalidArgument` — either id is empty; nothing is sent.
/// - `IntuneError::Api` / `IntuneError::Auth` / `IntuneError::Network` —
///   the POST failed.
pub async fn assign_script(
    client: &GraphClient,
    filter_id: &str,
    script_id: &str,
    schedule: RunSchedule,
) -> Result<()> {
    if filter_id.is_empty() {
        return Err(IntuneError::InvalidArgument(
            "assignment requires a filter id".to_string(),
        ));
    }
    if script_id.is_empty() {
        return Err(IntuneError::InvalidArgument(
            "assignment requires a script id".to_string(),
        ));
    }

    info!(script_id, filter_id, ?schedule, "Assigning script to filter");
    let path = format!("{SCRIPTS_PATH}/{script_id}/assign");
    let request = AssignRequest::new(filter_id, schedule);
    client.transport().post(&path, Some(&request)).await?;
    Ok(())
}

/// Schedules a single run, `run_once_delay` from now.
pub async fn assign_script_once(
    client: &GraphClient,
    filter_id: &str,
    script_id: &str,
) -> Result<()> {
    let schedule = RunSchedule::run_once(client.now(), &client.options().schedule)?;
    assign_script(client, filter_id, script_id, schedule).await
}

/// Schedules a recurring run every `hourly_interval` hours.
pub async fn assign_script_hourly(
    client: &GraphClient,
    filter_id: &str,
    script_id: &str,
) -> Result<()> {
    let schedule = RunSchedule::hourly(&client.options().schedule);
    assign_script(client, filter_id, script_id, schedule).await
}
