//! Model version lifecycle stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Lifecycle label controlling which version a consumer should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Stage {
    /// Registered but not promoted anywhere
    #[default]
    None,
    /// Pre-production candidate
    Staging,
    /// Serving in production
    Production,
    /// Retired
    Archived,
}

impl Stage {
    /// Every canonical stage, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::None, Self::Staging, Self::Production, Self::Archived];

    /// Stages consulted by `get_latest_versions` when the caller names none.
    pub const DEFAULT_LATEST: [Self; 2] = [Self::Staging, Self::Production];

    /// Canonical spelling, as persisted in `model_versions.current_stage`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        }
    }

    /// Resolve user-supplied stage text to its canonical stage.
    ///
    /// Matching ignores ASCII case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] for any other text.
    pub fn canonicalize(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                RegistryError::InvalidArgument(format!(
                    "Invalid Model Version stage {input}. Expected one of: {}",
                    allowed.join(", ")
                ))
            })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::canonicalize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_case_insensitive() {
        assert_eq!(Stage::canonicalize("staging").unwrap(), Stage::Staging);
        assert_eq!(Stage::canonicalize("PRODUCTION").unwrap(), Stage::Production);
        assert_eq!(Stage::canonicalize(" archived ").unwrap(), Stage::Archived);
        assert_eq!(Stage::canonicalize("none").unwrap(), Stage::None);
    }

    #[test]
    fn canonicalize_rejects_unknown_stage() {
        let err = Stage::canonicalize("prod").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert!(err.to_string().contains("Staging"));
    }

    #[test]
    fn as_str_round_trips_through_canonicalize() {
        for stage in Stage::ALL {
            assert_eq!(Stage::canonicalize(stage.as_str()).unwrap(), stage);
        }
    }

    #[test]
    fn default_latest_stages() {
        assert_eq!(Stage::DEFAULT_LATEST, [Stage::Staging, Stage::Production]);
        assert_eq!(Stage::default(), Stage::None);
    }
}
