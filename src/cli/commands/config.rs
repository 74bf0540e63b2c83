//! mreg config - Show effective configuration

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::config::Config;
use crate::error::{RegistryError, Result};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the merged configuration as TOML
    #[arg(long)]
    pub toml: bool,
}

pub fn run(ctx: &AppContext, args: &ConfigArgs) -> Result<()> {
    let store_uri = ctx.store_uri()?.to_string();
    let artifacts_root = ctx.config.artifacts.resolve_root(&ctx.root);
    let sources = config_sources(ctx);

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "config": ctx.config,
            "resolved": {
                "store_uri": store_uri,
                "artifacts_root": artifacts_root,
            },
            "sources": sources,
        })));
    }

    if args.toml {
        let rendered = toml::to_string_pretty(&ctx.config)
            .map_err(|err| RegistryError::Config(format!("render config: {err}")))?;
        print!("{rendered}");
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Configuration")
        .kv("Store URI", &store_uri)
        .kv("Pool size", &ctx.config.store.pool_size.to_string())
        .kv(
            "Busy timeout",
            &format!("{} ms", ctx.config.store.busy_timeout_ms),
        )
        .kv(
            "Version retries",
            &ctx.config.registry.create_version_retries.to_string(),
        )
        .kv("Artifacts root", &artifacts_root.display().to_string())
        .blank()
        .section("Sources");
    for source in &sources {
        layout.bullet(source);
    }
    emit_human(layout);
    Ok(())
}

fn config_sources(ctx: &AppContext) -> Vec<String> {
    if let Some(path) = &ctx.config_path {
        return vec![path.display().to_string()];
    }
    let mut sources = Vec::new();
    if let Some(global) = Config::global_path().filter(|p| p.exists()) {
        sources.push(global.display().to_string());
    }
    let project = ctx.root.join("config.toml");
    if project.exists() {
        sources.push(project.display().to_string());
    }
    if sources.is_empty() {
        sources.push("defaults".to_string());
    }
    sources
}
