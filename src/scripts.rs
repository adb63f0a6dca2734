//! Device health script packages (detection + remediation script pairs).
//!
//! | Function | API Path |
//! |----------|----------|
//! | [`new_script_package`] | POST `deviceManagement/deviceHealthScripts` |
//! | [`delete_script_package`] | DELETE `deviceManagement/deviceHealthScripts/{id}` |
//!
//! Assigning a package to devices lives in [`crate::assignments`].

use serde::Serialize;
use tracing::info;

use crate::client::GraphClient;
use crate::error::{IntuneError, Result};
use crate::filters::DEFAULT_SCOPE_TAG;
use crate::transport::extract_id;

pub(crate) const SCRIPTS_PATH: &str = "deviceManagement/deviceHealthScripts";

/// Account context the scripts execute under on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunAsAccount {
    /// Local system account.
    #[default]
    System,
    /// The signed-in user.
    User,
}

/// A script package as uploaded to Intune.
///
/// Build with [`ScriptPackage::new`] and adjust with the `with_*` methods;
/// defaults are an empty description, publisher and remediation script, a
/// 32-bit host, and the system account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPackage {
    /// Name shown in the Intune portal.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
    /// Publisher shown in the portal.
    pub publisher: String,
    /// PowerShell source of the detection script.
    pub detection_script: String,
    /// PowerShell source run when detection exits non-zero.
    pub remediation_script: String,
    /// Run under the 32-bit PowerShell host.
    pub run_as_32_bit: bool,
    /// Account the scripts run as.
    pub run_as_account: RunAsAccount,
}

impl ScriptPackage {
    /// A package with the given name and detection script.
    pub fn new(display_name: &str, detection_script: &str) -> Self {
        ScriptPackage {
            display_name: display_name.to_string(),
            description: String::new(),
            publisher: String::new(),
            detection_script: detection_script.to_string(),
            remediation_script: String::new(),
            run_as_32_bit: true,
            run_as_account: RunAsAccount::System,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Sets the publisher.
    pub fn with_publisher(mut self, publisher: &str) -> Self {
        self.publisher = publisher.to_string();
        self
    }

    /// Sets the remediation script source.
    pub fn with_remediation_script(mut self, remediation_script: &str) -> Self {
        self.remediation_script = remediation_script.to_string();
        self
    }

    /// Chooses the 32-bit or 64-bit host.
    pub fn with_run_as_32_bit(mut self, run_as_32_bit: bool) -> Self {
        self.run_as_32_bit = run_as_32_bit;
        self
    }

    /// Sets the execution account.
    pub fn with_run_as_account(mut self, run_as_account: RunAsAccount) -> Self {
        self.run_as_account = run_as_account;
        self
    }

    /// The POST body for this package.
    pub fn to_request(&self) -> ScriptPackageRequest<'_> {
        ScriptPackageRequest {
            display_name: &self.display_name,
            description: &self.description,
            publisher: &self.publisher,
            run_as_32_bit: self.run_as_32_bit,
            run_as_account: self.run_as_account,
            enforce_signature_check: false,
            detection_script_content: &self.detection_script,
            remediation_script_content: &self.remediation_script,
            role_scope_tag_ids: [DEFAULT_SCOPE_TAG],
        }
    }
}

/// Request body for POST `deviceManagement/deviceHealthScripts`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPackageRequest<'a> {
    /// See [`ScriptPackage::display_name`].
    pub display_name: &'a str,
    /// See [`ScriptPackage::description`].
    pub description: &'a str,
    /// See [`ScriptPackage::publisher`].
    pub publisher: &'a str,
    /// See [`ScriptPackage::run_as_32_bit`].
    #[serde(rename = "runAs32Bit")]
    pub run_as_32_bit: bool,
    /// See [`ScriptPackage::run_as_account`].
    pub run_as_account: RunAsAccount,
    /// Always `false`.
    pub enforce_signature_check: bool,
    /// Detection script source.
    pub detection_script_content: &'a str,
    /// Remediation script source.
    pub remediation_script_content: &'a str,
    /// Always the default scope tag.
    pub role_scope_tag_ids: [&'a str; 1],
}

/// Uploads a script package and returns its server-assigned id.
///
/// # Errors
///
/// - `IntuneError::MissingId` — Graph answered without a top-level `id`.
/// - `IntuneError::Api` / `IntuneError::Auth` / `IntuneError::Network` —
///   the POST failed.
pub async fn new_script_package(
    client: &GraphClient,
    package: &ScriptPackage,
) -> Result<Option<String>> {
    info!(
        display_name = %package.display_name,
        "Creating new detection script"
    );

    let Some(response) = client
        .transport()
        .post(SCRIPTS_PATH, Some(&package.to_request()))
        .await?
    else {
        return Ok(None);
    };

    let script_id = extract_id(&response).ok_or(IntuneError::MissingId {
        resource: "script package",
    })?;
    info!(script_id = %script_id, "Obtained script ID");
    Ok(Some(script_id))
}

/// Deletes a script package by id.
pub async fn delete_script_package(client: &GraphClient, script_id: &str) -> Result<()> {
    info!(script_id, "Deleting detection script");
    client
        .transport()
        .delete(&format!("{SCRIPTS_PATH}/{script_id}"))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults_match_graph_expectations() {
        let package = ScriptPackage::new("Detect", "echo 1");
        let json = serde_json::to_value(package.to_request()).unwrap();
        assert_eq!(
            json,
            json!({
                "displayName": "Detect",
                "description": "",
                "publisher": "",
                "runAs32Bit": true,
                "runAsAccount": "system",
                "enforceSignatureCheck": false,
                "detectionScriptContent": "echo 1",
                "remediationScriptContent": "",
                "roleScopeTagIds": ["0"]
            })
        );
    }

    #[test]
    fn builder_overrides_every_optional_field() {
        let package = ScriptPackage::new("Fix", "exit 1")
            .with_description("desc")
            .with_publisher("IT")
            .with_remediation_script("Restart-Service x")
            .with_run_as_32_bit(false)
            .with_run_as_account(RunAsAccount::User);
        let json = serde_json::to_value(package.to_request()).unwrap();

        assert_eq!(json["description"], "desc");
        assert_eq!(json["publisher"], "IT");
        assert_eq!(json["remediationScriptContent"], "Restart-Service x");
        assert_eq!(json["runAs32Bit"], false);
        assert_eq!(json["runAsAccount"], "user");
        assert_eq!(json["enforceSignatureCheck"], false);
    }
}
