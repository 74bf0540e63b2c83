//! Plain-data registry entities.
//!
//! These are detached snapshots handed to callers. Persistence rows live in
//! `storage` and never escape it.

pub mod stage;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

pub use stage::Stage;

/// Named container for an evolving sequence of model versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    /// Milliseconds since the Unix epoch
    pub creation_timestamp: i64,
    /// Milliseconds since the Unix epoch
    pub last_updated_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A registered model together with its latest version per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModelDetailed {
    #[serde(flatten)]
    pub model: RegisteredModel,
    /// Highest-numbered version of every stage that has one, in stage order
    pub latest_versions: Vec<ModelVersionDetailed>,
}

/// Identity of a model version: parent name plus assigned number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: i64,
}

impl ModelVersion {
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Registration state of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelVersionStatus {
    PendingRegistration,
    FailedRegistration,
    #[default]
    Ready,
}

impl ModelVersionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingRegistration => "PENDING_REGISTRATION",
            Self::FailedRegistration => "FAILED_REGISTRATION",
            Self::Ready => "READY",
        }
    }

    /// Parse the persisted spelling.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] for text no writer produces.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PENDING_REGISTRATION" => Ok(Self::PendingRegistration),
            "FAILED_REGISTRATION" => Ok(Self::FailedRegistration),
            "READY" => Ok(Self::Ready),
            other => Err(RegistryError::InvalidState(format!(
                "unknown model version status {other}"
            ))),
        }
    }
}

/// Full snapshot of one model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersionDetailed {
    #[serde(flatten)]
    pub key: ModelVersion,
    pub creation_timestamp: i64,
    pub last_updated_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub current_stage: Stage,
    /// Opaque artifact location; never copied or validated by the registry
    pub source: String,
    pub run_id: String,
    pub status: ModelVersionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl ModelVersionDetailed {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> i64 {
        self.key.version
    }
}

/// One page of results plus the token for the next page.
///
/// The registry answers every search in a single page, so
/// `next_page_token` is currently always `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> PagedList<T> {
    pub fn single_page(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for PagedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_accepts_persisted_values() {
        for status in [
            ModelVersionStatus::PendingRegistration,
            ModelVersionStatus::FailedRegistration,
            ModelVersionStatus::Ready,
        ] {
            assert_eq!(ModelVersionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ModelVersionStatus::parse("ready").is_err());
    }

    #[test]
    fn model_version_detailed_serializes_flat() {
        let mv = ModelVersionDetailed {
            key: ModelVersion::new("churn", 2),
            creation_timestamp: 1,
            last_updated_timestamp: 2,
            description: None,
            current_stage: Stage::Staging,
            source: "s3://bucket/churn/2".to_string(),
            run_id: "run-1".to_string(),
            status: ModelVersionStatus::Ready,
            status_message: None,
        };
        let json = serde_json::to_value(&mv).unwrap();
        assert_eq!(json["name"], "churn");
        assert_eq!(json["version"], 2);
        assert_eq!(json["current_stage"], "Staging");
        assert_eq!(json["status"], "READY");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn paged_list_single_page_has_no_token() {
        let page = PagedList::single_page(vec![1, 2, 3]);
        assert_eq!(page.len(), 3);
        assert!(page.next_page_token.is_none());
        assert_eq!(page.into_iter().sum::<i32>(), 6);
    }

    #[test]
    fn model_version_display() {
        assert_eq!(ModelVersion::new("fraud", 7).to_string(), "fraud/7");
    }
}
