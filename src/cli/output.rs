use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::entities::{ModelVersionDetailed, RegisteredModel, Stage};
use crate::error::{RegistryError, Result, StructuredError};

#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
    Error(StructuredError),
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse {
        status: RobotStatus::Ok,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data,
    }
}

pub fn robot_error(err: &RegistryError) -> RobotResponse<serde_json::Value> {
    RobotResponse {
        status: RobotStatus::Error(err.to_structured()),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        data: serde_json::Value::Null,
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

/// Report a failed command: structured JSON on stdout in robot mode,
/// a colored message plus suggestion on stderr otherwise.
pub fn emit_error(err: &RegistryError, robot: bool) {
    if robot {
        match serde_json::to_string(&robot_error(err)) {
            Ok(payload) => println!("{payload}"),
            Err(_) => println!(
                "{}",
                serde_json::json!({ "error": true, "message": err.to_string() })
            ),
        }
        return;
    }
    let structured = err.to_structured();
    eprintln!("{} {}", "error:".red().bold(), structured.message);
    eprintln!("{} {}", "hint:".yellow(), structured.suggestion);
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let key = format!("{key:width$}", width = self.key_width);
        self.lines.push(format!("{} {value}", key.dimmed()));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

/// Render epoch milliseconds as RFC 3339, falling back to the raw number.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

pub fn stage_label(stage: Stage) -> String {
    match stage {
        Stage::Production => stage.as_str().green().bold().to_string(),
        Stage::Staging => stage.as_str().yellow().to_string(),
        Stage::Archived => stage.as_str().dimmed().to_string(),
        Stage::None => stage.as_str().to_string(),
    }
}

pub fn model_layout(layout: &mut HumanLayout, model: &RegisteredModel) {
    layout
        .kv("Name", &model.name)
        .kv("Description", model.description.as_deref().unwrap_or("-"))
        .kv("Created", &format_millis(model.creation_timestamp))
        .kv("Last updated", &format_millis(model.last_updated_timestamp));
}

pub fn version_layout(layout: &mut HumanLayout, mv: &ModelVersionDetailed) {
    layout
        .kv("Model", mv.name())
        .kv("Version", &mv.version().to_string())
        .kv("Stage", &stage_label(mv.current_stage))
        .kv("Status", mv.status.as_str())
        .kv("Source", &mv.source)
        .kv("Run", &mv.run_id)
        .kv("Description", mv.description.as_deref().unwrap_or("-"))
        .kv("Created", &format_millis(mv.creation_timestamp))
        .kv("Last updated", &format_millis(mv.last_updated_timestamp));
}

/// One-line summary used by list-style output.
pub fn version_line(mv: &ModelVersionDetailed) -> String {
    format!(
        "{} v{}  {}  {}",
        mv.name().bold(),
        mv.version(),
        stage_label(mv.current_stage),
        mv.source
    )
}
