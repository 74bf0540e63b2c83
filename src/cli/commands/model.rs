//! mreg model - Manage registered models.

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{
    HumanLayout, emit_human, emit_json, model_layout, robot_ok, version_line,
};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ModelArgs {
    #[command(subcommand)]
    pub command: ModelCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Register a new, empty model
    Create(ModelCreateArgs),
    /// Rename a model or change its description
    Update(ModelUpdateArgs),
    /// Delete a model and all of its versions
    Delete(ModelNameArgs),
    /// List registered models
    List,
    /// Show a model with its latest version per stage
    Show(ModelNameArgs),
    /// Show the latest version in each requested stage
    Latest(ModelLatestArgs),
}

#[derive(Args, Debug)]
pub struct ModelNameArgs {
    /// Registered model name
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ModelCreateArgs {
    /// Registered model name
    pub name: String,

    /// Optional description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ModelUpdateArgs {
    /// Current model name
    pub name: String,

    /// New model name; versions follow the rename
    #[arg(long)]
    pub new_name: Option<String>,

    /// New description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ModelLatestArgs {
    /// Registered model name
    pub name: String,

    /// Stage to include (repeatable; default: Staging and Production)
    #[arg(long = "stage", short = 's')]
    pub stages: Vec<String>,
}

pub fn run(ctx: &AppContext, args: &ModelArgs) -> Result<()> {
    match &args.command {
        ModelCommand::Create(create) => run_create(ctx, create),
        ModelCommand::Update(update) => run_update(ctx, update),
        ModelCommand::Delete(delete) => run_delete(ctx, delete),
        ModelCommand::List => run_list(ctx),
        ModelCommand::Show(show) => run_show(ctx, show),
        ModelCommand::Latest(latest) => run_latest(ctx, latest),
    }
}

fn run_create(ctx: &AppContext, args: &ModelCreateArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let mut model = store.create_registered_model(&args.name)?;
    if let Some(description) = args.description.as_deref() {
        model = store.update_registered_model(&model.name, None, Some(description))?;
    }

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "registered_model": model })));
    }

    let mut layout = HumanLayout::new();
    layout.title("Registered Model Created");
    model_layout(&mut layout, &model);
    emit_human(layout);
    Ok(())
}

fn run_update(ctx: &AppContext, args: &ModelUpdateArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let model = store.update_registered_model(
        &args.name,
        args.new_name.as_deref(),
        args.description.as_deref(),
    )?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "registered_model": model })));
    }

    let mut layout = HumanLayout::new();
    layout.title("Registered Model Updated");
    model_layout(&mut layout, &model);
    emit_human(layout);
    Ok(())
}

fn run_delete(ctx: &AppContext, args: &ModelNameArgs) -> Result<()> {
    let store = ctx.open_store()?;
    store.delete_registered_model(&args.name)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "deleted": args.name })));
    }
    println!("Deleted registered model {}", args.name);
    Ok(())
}

fn run_list(ctx: &AppContext) -> Result<()> {
    let store = ctx.open_store()?;
    let models = store.list_registered_models()?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "count": models.len(),
            "registered_models": models,
        })));
    }

    if models.is_empty() {
        println!("No registered models.");
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Registered Models ({})", models.len()));
    for model in &models {
        match model.description.as_deref() {
            Some(description) => layout.bullet(&format!("{} - {description}", model.name)),
            None => layout.bullet(&model.name),
        };
    }
    emit_human(layout);
    Ok(())
}

fn run_show(ctx: &AppContext, args: &ModelNameArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let details = store.get_registered_model_details(&args.name)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({ "registered_model": details })));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Registered Model {}", details.model.name));
    model_layout(&mut layout, &details.model);
    layout.blank().section("Latest versions");
    if details.latest_versions.is_empty() {
        layout.bullet("none");
    }
    for mv in &details.latest_versions {
        layout.bullet(&version_line(mv));
    }
    emit_human(layout);
    Ok(())
}

fn run_latest(ctx: &AppContext, args: &ModelLatestArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let versions = store.get_latest_versions(&args.name, &args.stages)?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "name": args.name,
            "model_versions": versions,
        })));
    }

    if versions.is_empty() {
        println!("No versions of {} in the requested stages.", args.name);
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Latest versions of {}", args.name));
    for mv in &versions {
        layout.bullet(&version_line(mv));
    }
    emit_human(layout);
    Ok(())
}
