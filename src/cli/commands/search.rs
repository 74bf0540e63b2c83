//! mreg search - Search model versions

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, version_line};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Filter such as "name = 'churn'", "run_id = 'abc'" or
    /// "source_path = 's3://bucket/model'"; omit to list every version
    pub filter: Option<String>,
}

pub fn run(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let store = ctx.open_store()?;
    let page = store.search_model_versions(args.filter.as_deref().unwrap_or_default())?;

    if ctx.robot_mode {
        return emit_json(&robot_ok(serde_json::json!({
            "count": page.len(),
            "model_versions": page.items,
            "next_page_token": page.next_page_token,
        })));
    }

    if page.is_empty() {
        println!("No model versions found.");
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Model Versions ({})", page.len()));
    for mv in page.iter() {
        layout.bullet(&version_line(mv));
    }
    emit_human(layout);
    Ok(())
}
