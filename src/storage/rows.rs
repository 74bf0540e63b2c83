//! Persistence rows and their mapping to detached entities.

use std::collections::BTreeMap;

use rusqlite::Row;
use sqlx::Row as _;
use sqlx::any::AnyRow;

use crate::entities::{
    ModelVersion, ModelVersionDetailed, ModelVersionStatus, RegisteredModel, Stage,
};
use crate::error::{RegistryError, Result};

pub(crate) const REGISTERED_MODEL_COLUMNS: &str =
    "name, creation_time, last_updated_time, description";

pub(crate) const MODEL_VERSION_COLUMNS: &str = "name, version, creation_time, last_updated_time, \
     description, current_stage, source, run_id, status, status_message";

/// One `registered_models` row.
#[derive(Debug, Clone)]
pub(crate) struct SqlRegisteredModel {
    pub name: String,
    pub creation_time: i64,
    pub last_updated_time: i64,
    pub description: Option<String>,
}

impl SqlRegisteredModel {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            creation_time: row.get(1)?,
            last_updated_time: row.get(2)?,
            description: row.get(3)?,
        })
    }

    pub fn from_any_row(row: &AnyRow) -> sqlx::Result<Self> {
        Ok(Self {
            name: row.try_get("name")?,
            creation_time: row.try_get("creation_time")?,
            last_updated_time: row.try_get("last_updated_time")?,
            description: row.try_get("description")?,
        })
    }

    pub fn to_entity(&self) -> RegisteredModel {
        RegisteredModel {
            name: self.name.clone(),
            creation_timestamp: self.creation_time,
            last_updated_timestamp: self.last_updated_time,
            description: self.description.clone(),
        }
    }
}

/// One `model_versions` row.
#[derive(Debug, Clone)]
pub(crate) struct SqlModelVersion {
    pub name: String,
    pub version: i64,
    pub creation_time: i64,
    pub last_updated_time: i64,
    pub description: Option<String>,
    pub current_stage: String,
    pub source: String,
    pub run_id: String,
    pub status: String,
    pub status_message: Option<String>,
}

impl SqlModelVersion {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            creation_time: row.get(2)?,
            last_updated_time: row.get(3)?,
            description: row.get(4)?,
            current_stage: row.get(5)?,
            source: row.get(6)?,
            run_id: row.get(7)?,
            status: row.get(8)?,
            status_message: row.get(9)?,
        })
    }

    pub fn from_any_row(row: &AnyRow) -> sqlx::Result<Self> {
        Ok(Self {
            name: row.try_get("name")?,
            version: row.try_get("version")?,
            creation_time: row.try_get("creation_time")?,
            last_updated_time: row.try_get("last_updated_time")?,
            description: row.try_get("description")?,
            current_stage: row.try_get("current_stage")?,
            source: row.try_get("source")?,
            run_id: row.try_get("run_id")?,
            status: row.try_get("status")?,
            status_message: row.try_get("status_message")?,
        })
    }

    pub fn to_entity(&self) -> ModelVersion {
        ModelVersion::new(self.name.clone(), self.version)
    }

    /// Detach the row. Fails if a column holds text no writer produces.
    pub fn to_detailed_entity(&self) -> Result<ModelVersionDetailed> {
        let current_stage = Stage::canonicalize(&self.current_stage).map_err(|_| {
            RegistryError::InvalidState(format!(
                "Model Version (name={}, version={}) has unknown stage {}",
                self.name, self.version, self.current_stage
            ))
        })?;
        Ok(ModelVersionDetailed {
            key: self.to_entity(),
            creation_timestamp: self.creation_time,
            last_updated_timestamp: self.last_updated_time,
            description: self.description.clone(),
            current_stage,
            source: self.source.clone(),
            run_id: self.run_id.clone(),
            status: ModelVersionStatus::parse(&self.status)?,
            status_message: self.status_message.clone(),
        })
    }
}

/// Highest-numbered version in each stage, keyed in stage order.
pub(crate) fn latest_per_stage(
    versions: &[SqlModelVersion],
) -> Result<BTreeMap<Stage, ModelVersionDetailed>> {
    let mut latest: BTreeMap<Stage, ModelVersionDetailed> = BTreeMap::new();
    for row in versions {
        let detailed = row.to_detailed_entity()?;
        match latest.get(&detailed.current_stage) {
            Some(existing) if existing.version() >= detailed.version() => {}
            _ => {
                latest.insert(detailed.current_stage, detailed);
            }
        }
    }
    Ok(latest)
}
