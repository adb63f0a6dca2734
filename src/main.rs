//! CLI entry point for intune-graph: drive Intune device management through
//! Microsoft Graph from the command line.
//!
//! Resolves configuration (file, then `INTUNE__*` environment, then flags),
//! authenticates with a refresh token, then dispatches to one subcommand.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (auth failure, API error, unreadable script, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};

use intune_graph::assignments::{ScheduleKind, assign_script_hourly, assign_script_once};
use intune_graph::auth::RefreshTokenProvider;
use intune_graph::client::GraphClient;
use intune_graph::config::AppConfig;
use intune_graph::deploy::deploy_remediation;
use intune_graph::devices::{get_devices, list_enrolled_devices, sync_device, trigger_remediation};
use intune_graph::error::{IntuneError, Result};
use intune_graph::filters::{delete_assignment_filter, new_assignment_filter};
use intune_graph::scripts::{RunAsAccount, ScriptPackage, delete_script_package, new_script_package};
use intune_graph::store::{DeviceStore, MemoryDeviceStore, SqliteDeviceStore};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults to `./intune.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at DEBUG instead of INFO.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Azure AD tenant ID. Overrides `auth.tenant_id`.
    #[arg(long, global = true, env = "INTUNE_TENANT_ID")]
    tenant_id: Option<String>,

    /// Public client ID the refresh token was issued to.
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Refresh token for the delegated Intune session. Prefer the
    /// INTUNE_REFRESH_TOKEN environment variable to keep it out of shell
    /// history and process listings.
    #[arg(long, global = true, env = "INTUNE_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query managed devices by id, by name, or all of them.
    Devices {
        #[arg(long)]
        device_id: Option<String>,
        #[arg(long)]
        device_name: Option<String>,
    },
    /// Print the raw enrolled-device collection.
    List,
    /// Create an assignment filter matching one device name.
    NewFilter { device_name: String },
    /// Delete an assignment filter.
    DeleteFilter { filter_id: String },
    /// Upload a detection/remediation script package.
    NewScript(ScriptArgs),
    /// Delete a script package.
    DeleteScript { script_id: String },
    /// Assign a script package to the devices matched by a filter.
    Assign {
        #[arg(long)]
        filter_id: String,
        #[arg(long)]
        script_id: String,
        /// Recur every hour instead of running once.
        #[arg(long)]
        hourly: bool,
    },
    /// Ask a device to check in with Intune.
    Sync { device_id: String },
    /// Start an on-demand remediation of a script package on a device.
    Remediate {
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        script_id: String,
    },
    /// Filter, upload, assign and optionally sync in one go.
    Deploy {
        #[arg(long)]
        device_name: String,
        /// Device ID to sync once the assignment is in place.
        #[arg(long)]
        sync_device_id: Option<String>,
        #[arg(long)]
        hourly: bool,
        #[command(flatten)]
        script: ScriptArgs,
    },
}

#[derive(Args)]
struct ScriptArgs {
    /// Display name of the script package.
    #[arg(long)]
    name: String,
    /// File holding the detection script.
    #[arg(long)]
    detection: PathBuf,
    /// File holding the remediation script.
    #[arg(long)]
    remediation: Option<PathBuf>,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    publisher: String,
    /// Run under the signed-in user instead of SYSTEM.
    #[arg(long)]
    run_as_user: bool,
    /// Use the 64-bit PowerShell host.
    #[arg(long)]
    run_64_bit: bool,
}

impl ScriptArgs {
    fn to_package(&self) -> Result<ScriptPackage> {
        let detection = read_script(&self.detection)?;
        let remediation = match &self.remediation {
            Some(path) => read_script(path)?,
            None => String::new(),
        };
        let account = if self.run_as_user {
            RunAsAccount::User
        } else {
            RunAsAccount::System
        };
        Ok(ScriptPackage::new(&self.name, &detection)
            .with_description(&self.description)
            .with_publisher(&self.publisher)
            .with_remediation_script(&remediation)
            .with_run_as_32_bit(!self.run_64_bit)
            .with_run_as_account(account))
    }
}

fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        IntuneError::InvalidArgument(format!("cannot read script {}: {e}", path.display()))
    })
}

fn schedule_kind(hourly: bool) -> ScheduleKind {
    if hourly {
        ScheduleKind::Hourly
    } else {
        ScheduleKind::Once
    }
}

fn build_client(cli: &Cli, config: &AppConfig) -> Result<GraphClient> {
    let tenant_id = cli.tenant_id.as_deref().unwrap_or(&config.auth.tenant_id);
    let client_id = cli.client_id.as_deref().unwrap_or(&config.auth.client_id);
    let refresh_token = cli
        .refresh_token
        .as_deref()
        .unwrap_or(&config.auth.refresh_token);

    let mut auth = RefreshTokenProvider::new(tenant_id, client_id, refresh_token);
    if let Some(url) = &config.auth.token_url {
        auth = auth.with_token_url(url);
    }
    Ok(GraphClient::with_base_url(auth, &config.graph.base_url)?
        .with_options(config.client_options()?))
}

async fn require_session(client: &GraphClient) -> Result<()> {
    match client.establish_session().await? {
        Some(_) => Ok(()),
        None => Err(IntuneError::auth("could not obtain an Intune access token")),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let client = build_client(&cli, &config)?;

    match &cli.command {
        Command::Devices {
            device_id,
            device_name,
        } => {
            let store: Box<dyn DeviceStore> = match &config.store.path {
                Some(path) => Box::new(SqliteDeviceStore::open(path)?),
                None => Box::new(MemoryDeviceStore::new()),
            };
            let devices = get_devices(
                &client,
                device_id.as_deref(),
                device_name.as_deref(),
                Some(store.as_ref()),
            )
            .await?;
            for device in &devices {
                println!("{device}");
            }
        }
        Command::List => {
            require_session(&client).await?;
            println!("{}", list_enrolled_devices(&client).await?);
        }
        Command::NewFilter { device_name } => {
            require_session(&client).await?;
            match new_assignment_filter(&client, device_name).await? {
                Some(id) => println!("{id}"),
                None => {
                    return Err(IntuneError::UnexpectedResponse(
                        "no filter was created".into(),
                    ));
                }
            }
        }
        Command::DeleteFilter { filter_id } => {
            require_session(&client).await?;
            delete_assignment_filter(&client, filter_id).await?;
        }
        Command::NewScript(args) => {
            let package = args.to_package()?;
            require_session(&client).await?;
            match new_script_package(&client, &package).await? {
                Some(id) => println!("{id}"),
                None => {
                    return Err(IntuneError::UnexpectedResponse(
                        "no script package was created".into(),
                    ));
                }
            }
        }
        Command::DeleteScript { script_id } => {
            require_session(&client).await?;
            delete_script_package(&client, script_id).await?;
        }
        Command::Assign {
            filter_id,
            script_id,
            hourly,
        } => {
            require_session(&client).await?;
            if *hourly {
                assign_script_hourly(&client, filter_id, script_id).await?;
            } else {
                assign_script_once(&client, filter_id, script_id).await?;
            }
        }
        Command::Sync { device_id } => {
            require_session(&client).await?;
            sync_device(&client, device_id).await?;
        }
        Command::Remediate {
            device_id,
            script_id,
        } => {
            require_session(&client).await?;
            trigger_remediation(&client, device_id, script_id).await?;
        }
        Command::Deploy {
            device_name,
            sync_device_id,
            hourly,
            script,
        } => {
            let package = script.to_package()?;
            let deployment = deploy_remediation(
                &client,
                device_name,
                &package,
                schedule_kind(*hourly),
                sync_device_id.as_deref(),
            )
            .await?
            .ok_or_else(|| {
                IntuneError::UnexpectedResponse("deployment produced no objects".into())
            })?;
            println!("filter: {}", deployment.filter_id);
            println!("script: {}", deployment.script_id);
        }
    }

    info!("Done");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
