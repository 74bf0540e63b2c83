//! mreg version - Manage model versions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, version_layout};
use crate::entities::ModelVersion;
use crate::error::{RegistryError, Result};

#[derive(Args, Debug)]
pub struct VersionArgs {
    #[command(subcommand)]
    pub command: VersionCommand,
}

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    /// Register a new version of a model
    Create(VersionCreateArgs),
    /// Change a version's stage or description
    Update(VersionUpdateArgs),
    /// Delete a version
    Delete(VersionKeyArgs),
    /// Show a version
    Show(VersionKeyArgs),
    /// Print the artifact location recorded for a version
    DownloadUri(VersionKeyArgs),
    /// Resolve a version's artifact to a local path
    Download(VersionKeyArgs),
}

#[derive(Args, Debug)]
pub struct VersionKeyArgs {
    /// Registered model name
    pub name: String,

    /// Version number
    #[arg(id = "model_version", value_name = "VERSION")]
    pub version: i64,
}

impl VersionKeyArgs {
    fn key(&self) -> ModelVersion {
        ModelVersion::new(self.name.clone(), self.version)
    }
}

#[derive(Args, Debug)]
pub struct VersionCreateArgs {
    /// Registered model name
    pub name: String,

    /// Artifact location to record, e.g. s3://bucket/model
    #[arg(long, required_unless_present = "artifact", conflicts_with = "artifact")]
    pub source: Option<String>,

    /// Local artifact file to upload to the artifact store first
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Run that produced the model
    #[arg(long)]
    pub run_id: String,
}

#[derive(Args, Debug)]
pub struct VersionUpdateArgs {
    /// Registered model name
    pub name: String,

    /// Version number
    #[arg(id = "model_version", value_name = "VERSION")]
    pub version: i64,

    /// New stage: None, Staging, Production or Archived (case-insensitive)
    #[arg(long)]
    pub stage: Option<String>,

    /// New description
    #[arg(long)]
    pub description: Option<String>,
}

pub fn run(ctx: &AppContext, args: &VersionArgs) -> Result<()> {
    match &args.command {
        VersionCommand::Create(create) => run_create(ctx, create),
        VersionCommand::Update(update) => run_update(ctx, update),
        VersionCommand::Delete(key) => run_delete(ctx, key),
        VersionCommand::Show(key) => run_show(ctx, key),
        VersionCommand::DownloadUri(key) => run_download_uri(ctx, key),
        VersionCommand::Download(key) => run_download(ctx, key),
    }
}

fn run_create(ctx: &AppContext, args: &VersionCreateArgs) -> Result<()> {
    let store = ctx.open_store()?;
    // Nothing is uploaded for a model that does not exist.
    store.get_registered_model_details(&args.name)?;
    let source = match (&args.source, &args.artifact) {
        (Some(source), _) => source.clone(),
        (None, Some(artifact)) => {
            let file_name = artifact
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    RegistryError::InvalidArgument(format!(
                        "artifact path {} has no file name",
                        artifact.display()
                    ))
                })?;
            let dest = format!("{}/{}/{file_name}", args.name, args.run_id);
            ctx.artifacts.upload(artifact, &dest)?
        }
        (None, None) => {
            return Err(RegistryError::InvalidArgument(
                "either --source or --artifact is required".to_string(),
            ));
        }
    };

    let created = store.create_model_version(&args.name, &source, &args.run_id)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "model_version": created,
            "source": source,
        })));
    }
    println!(
        "Created version {} of {} from {source}",
        created.version, created.name
    );
    Ok(())
}

fn run_update(ctx: &AppContext, args: &VersionUpdateArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let key = ModelVersion::new(args.name.clone(), args.version);
    let updated =
        store.update_model_version(&key, args.stage.as_deref(), args.description.as_deref())?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "model_version": updated })));
    }

    let mut layout = HumanLayout::new();
    layout.title("Model Version Updated");
    version_layout(&mut layout, &updated);
    emit_human(layout);
    Ok(())
}

fn run_delete(ctx: &AppContext, args: &VersionKeyArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let key = args.key();
    store.delete_model_version(&key)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "deleted": key })));
    }
    println!("Deleted model version {key}");
    Ok(())
}

fn run_show(ctx: &AppContext, args: &VersionKeyArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let details = store.get_model_version_details(&args.key())?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "model_version": details })));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Model Version {}", details.key));
    version_layout(&mut layout, &details);
    emit_human(layout);
    Ok(())
}

fn run_download_uri(ctx: &AppContext, args: &VersionKeyArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let uri = store.get_model_version_download_uri(&args.key())?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "download_uri": uri })));
    }
    println!("{uri}");
    Ok(())
}

fn run_download(ctx: &AppContext, args: &VersionKeyArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let uri = store.get_model_version_download_uri(&args.key())?;
    let local = ctx.artifacts.download(&uri)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "download_uri": uri,
            "local_path": local,
        })));
    }
    println!("{}", local.display());
    Ok(())
}
