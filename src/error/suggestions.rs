//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module with hints that
//! name the model or dialect involved.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a context-aware suggestion for an error.
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::ConflictRetriesExhausted => suggest_retries_exhausted(context),
        ErrorCode::UnsupportedBackend => suggest_unsupported_backend(context),
        ErrorCode::ConfigMissingRequired => suggest_config_missing(context),
        _ => code.suggestion().to_string(),
    }
}

fn suggest_retries_exhausted(context: Option<&Value>) -> String {
    let Some(name) = context.and_then(|c| c.get("name")).and_then(Value::as_str) else {
        return ErrorCode::ConflictRetriesExhausted.suggestion().to_string();
    };
    let attempts = context
        .and_then(|c| c.get("attempts"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    format!(
        "Version creation for '{name}' collided {attempts} times. Try:\n  - retrying once other registrations of '{name}' finish\n  - raising registry.create_version_retries in config.toml"
    )
}

fn suggest_unsupported_backend(context: Option<&Value>) -> String {
    match context.and_then(|c| c.get("dialect")).and_then(Value::as_str) {
        Some(dialect) => format!(
            "'{dialect}' URIs are recognised but have no driver in this build. Use sqlite:///<path>, postgresql://... or mysql://..."
        ),
        None => ErrorCode::UnsupportedBackend.suggestion().to_string(),
    }
}

fn suggest_config_missing(context: Option<&Value>) -> String {
    match context.and_then(|c| c.get("config_key")).and_then(Value::as_str) {
        Some(key) => format!("Set '{key}' in config.toml or through its MREG_* environment variable"),
        None => ErrorCode::ConfigMissingRequired.suggestion().to_string(),
    }
}
