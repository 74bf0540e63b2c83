//! Registry store: registered models, their versions, and stage management.
//!
//! Every public operation runs inside exactly one scoped transaction on the
//! store's [`Backend`], except [`RegistryStore::create_model_version`], which
//! opens one write transaction per attempt. Results are detached entity
//! snapshots; row types never leave this module tree.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::entities::{
    ModelVersion, ModelVersionDetailed, PagedList, RegisteredModel, RegisteredModelDetailed, Stage,
};
use crate::error::{RegistryError, Result};
use crate::search::ModelVersionFilter;

use super::backend::{Backend, RegistryTx, SqlParam};
use super::rows::{
    MODEL_VERSION_COLUMNS, REGISTERED_MODEL_COLUMNS, SqlModelVersion, SqlRegisteredModel,
    latest_per_stage,
};
use super::session::PoolOptions;
use super::uri::DbUri;

/// Attempts made by [`RegistryStore::create_model_version`] before giving up.
pub const DEFAULT_CREATE_MODEL_VERSION_RETRIES: u32 = 3;

/// Behavioural knobs for [`RegistryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Read-compute-insert attempts per version creation; at least 1
    pub create_version_retries: u32,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            create_version_retries: DEFAULT_CREATE_MODEL_VERSION_RETRIES,
        }
    }
}

/// Transactional model registry over a relational backing store.
#[derive(Debug)]
pub struct RegistryStore {
    backend: Backend,
    uri: DbUri,
    create_version_retries: u32,
}

impl RegistryStore {
    /// Open the store named by `uri`, creating and verifying the schema.
    ///
    /// SQLite files are opened in-process; `postgresql://` and `mysql://`
    /// URIs connect a pool to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedBackend`] for dialects this build
    /// has no driver for, [`RegistryError::Transient`] when a server cannot
    /// be reached, and [`RegistryError::SchemaMismatch`] when the schema is
    /// unusable after bootstrap.
    pub fn open(uri: &DbUri, pool: &PoolOptions, options: &RegistryOptions) -> Result<Self> {
        let (backend, schema_version) = Backend::open(uri, pool)?;
        info!(uri = %uri, schema_version, "opened model registry");

        Ok(Self {
            backend,
            uri: uri.clone(),
            create_version_retries: options.create_version_retries.max(1),
        })
    }

    /// Open a store from a connection string with default options.
    ///
    /// # Errors
    ///
    /// See [`RegistryStore::open`].
    pub fn open_uri(raw: &str) -> Result<Self> {
        Self::open(
            &DbUri::parse(raw)?,
            &PoolOptions::default(),
            &RegistryOptions::default(),
        )
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// See [`RegistryStore::open`].
    pub fn in_memory() -> Result<Self> {
        Self::open_uri("sqlite://")
    }

    #[must_use]
    pub fn uri(&self) -> &DbUri {
        &self.uri
    }

    #[must_use]
    pub fn create_version_retries(&self) -> u32 {
        self.create_version_retries
    }

    // ---------------------------------------------------------------------
    // Registered models
    // ---------------------------------------------------------------------

    /// Create an empty registered model.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] for a blank name,
    /// [`RegistryError::AlreadyExists`] if the name is taken.
    pub fn create_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        validate_model_name(name)?;
        let now = now_millis();
        let model = self.backend.write(|tx| {
            tx.execute(
                "INSERT INTO registered_models (name, creation_time, last_updated_time)
                 VALUES (?, ?, ?)",
                &[SqlParam::Text(name), SqlParam::Int(now), SqlParam::Int(now)],
            )
            .map_err(|err| already_exists(err, name))?;
            Ok(RegisteredModel {
                name: name.to_string(),
                creation_timestamp: now,
                last_updated_timestamp: now,
                description: None,
            })
        })?;
        info!(model = name, "created registered model");
        Ok(model)
    }

    /// Rename a model and/or replace its description.
    ///
    /// A rename carries every version along in the same transaction.
    /// Passing neither field returns the model unchanged.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if `name` is absent,
    /// [`RegistryError::InvalidArgument`] for a blank `new_name`,
    /// [`RegistryError::AlreadyExists`] if `new_name` is taken.
    pub fn update_registered_model(
        &self,
        name: &str,
        new_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<RegisteredModel> {
        if let Some(new_name) = new_name {
            validate_model_name(new_name)?;
        }
        let model = self.backend.write(|tx| {
            let mut row = get_registered_model_row(tx, name)?;
            if new_name.is_none() && description.is_none() {
                return Ok(row.to_entity());
            }

            let target = new_name.unwrap_or(name);
            if let Some(description) = description {
                row.description = Some(description.to_string());
            }
            row.last_updated_time = now_millis();
            tx.execute(
                "UPDATE registered_models
                 SET name = ?, description = ?, last_updated_time = ?
                 WHERE name = ?",
                &[
                    SqlParam::Text(target),
                    SqlParam::OptText(row.description.as_deref()),
                    SqlParam::Int(row.last_updated_time),
                    SqlParam::Text(name),
                ],
            )
            .map_err(|err| already_exists(err, target))?;
            row.name = target.to_string();
            Ok(row.to_entity())
        })?;

        if let Some(new_name) = new_name.filter(|n| *n != name) {
            info!(from = name, to = new_name, "renamed registered model");
        } else {
            debug!(model = name, "updated registered model");
        }
        Ok(model)
    }

    /// Delete a model and every one of its versions.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if `name` is absent.
    pub fn delete_registered_model(&self, name: &str) -> Result<()> {
        let removed_versions = self.backend.write(|tx| {
            get_registered_model_row(tx, name)?;
            let versions = tx.query_i64(
                "SELECT COUNT(*) FROM model_versions WHERE name = ?",
                &[SqlParam::Text(name)],
            )?;
            tx.execute(
                "DELETE FROM registered_models WHERE name = ?",
                &[SqlParam::Text(name)],
            )?;
            Ok(versions)
        })?;
        info!(model = name, removed_versions, "deleted registered model");
        Ok(())
    }

    /// Every registered model, ordered by name.
    pub fn list_registered_models(&self) -> Result<Vec<RegisteredModel>> {
        let models = self.backend.read(|tx| {
            let rows = tx.query_models(
                &format!("SELECT {REGISTERED_MODEL_COLUMNS} FROM registered_models ORDER BY name"),
                &[],
            )?;
            Ok(rows.iter().map(SqlRegisteredModel::to_entity).collect::<Vec<_>>())
        })?;
        debug!(count = models.len(), "listed registered models");
        Ok(models)
    }

    /// The model plus its highest-numbered version in every occupied stage.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if absent, [`RegistryError::InvalidState`]
    /// if the name matches more than one row.
    pub fn get_registered_model_details(&self, name: &str) -> Result<RegisteredModelDetailed> {
        debug!(model = name, "get registered model details");
        self.backend.read(|tx| {
            let row = get_registered_model_row(tx, name)?;
            let versions = load_versions(tx, name)?;
            Ok(RegisteredModelDetailed {
                model: row.to_entity(),
                latest_versions: latest_per_stage(&versions)?.into_values().collect(),
            })
        })
    }

    /// Latest version per requested stage, in stage order.
    ///
    /// An empty `stages` means [`Stage::DEFAULT_LATEST`]. Stages with no
    /// version are absent from the result.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] for unknown stage text,
    /// [`RegistryError::NotFound`] if the model is absent.
    pub fn get_latest_versions<S: AsRef<str>>(
        &self,
        name: &str,
        stages: &[S],
    ) -> Result<Vec<ModelVersionDetailed>> {
        let expected: BTreeSet<Stage> = if stages.is_empty() {
            Stage::DEFAULT_LATEST.into_iter().collect()
        } else {
            stages
                .iter()
                .map(|stage| Stage::canonicalize(stage.as_ref()))
                .collect::<Result<_>>()?
        };
        debug!(model = name, ?expected, "get latest versions");

        self.backend.read(|tx| {
            get_registered_model_row(tx, name)?;
            let versions = load_versions(tx, name)?;
            Ok(latest_per_stage(&versions)?
                .into_iter()
                .filter(|(stage, _)| expected.contains(stage))
                .map(|(_, version)| version)
                .collect())
        })
    }

    // ---------------------------------------------------------------------
    // Model versions
    // ---------------------------------------------------------------------

    /// Register a new version under `name`, numbered one past the highest
    /// existing version.
    ///
    /// A concurrent writer may claim the same number first; the attempt is
    /// then rolled back and repeated, up to the configured bound. On SQLite
    /// the write transaction is Immediate, so writers already serialize at
    /// `BEGIN` and the race cannot occur; the bounded retry guards the
    /// client-server engines, where two transactions can read the same
    /// maximum and collide on the primary key.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if the model is absent,
    /// [`RegistryError::RetriesExhausted`] if every attempt lost the race.
    pub fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion> {
        let version = retry_on_conflict(self.create_version_retries, name, || {
            self.backend.write(|tx| {
                get_registered_model_row(tx, name)?;
                let next = tx.query_i64(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions WHERE name = ?",
                    &[SqlParam::Text(name)],
                )?;
                let now = now_millis();
                tx.execute(
                    "INSERT INTO model_versions
                     (name, version, creation_time, last_updated_time, source, run_id)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    &[
                        SqlParam::Text(name),
                        SqlParam::Int(next),
                        SqlParam::Int(now),
                        SqlParam::Int(now),
                        SqlParam::Text(source),
                        SqlParam::Text(run_id),
                    ],
                )?;
                touch_registered_model(tx, name, now)?;
                Ok(ModelVersion::new(name, next))
            })
        })?;
        info!(model = name, version = version.version, source, run_id, "created model version");
        Ok(version)
    }

    /// Move a version to another stage and/or replace its description.
    ///
    /// Stage text is canonicalized before anything is written.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] for unknown stage text,
    /// [`RegistryError::NotFound`] if the version is absent.
    pub fn update_model_version(
        &self,
        version: &ModelVersion,
        stage: Option<&str>,
        description: Option<&str>,
    ) -> Result<ModelVersionDetailed> {
        let stage = stage.map(Stage::canonicalize).transpose()?;
        let updated = self.backend.write(|tx| {
            let mut row = get_model_version_row(tx, version)?;
            if stage.is_none() && description.is_none() {
                return row.to_detailed_entity();
            }
            if let Some(stage) = stage {
                row.current_stage = stage.as_str().to_string();
            }
            if let Some(description) = description {
                row.description = Some(description.to_string());
            }
            row.last_updated_time = now_millis();
            tx.execute(
                "UPDATE model_versions
                 SET current_stage = ?, description = ?, last_updated_time = ?
                 WHERE name = ? AND version = ?",
                &[
                    SqlParam::Text(&row.current_stage),
                    SqlParam::OptText(row.description.as_deref()),
                    SqlParam::Int(row.last_updated_time),
                    SqlParam::Text(&version.name),
                    SqlParam::Int(version.version),
                ],
            )?;
            row.to_detailed_entity()
        })?;
        match stage {
            Some(stage) => info!(%version, %stage, "transitioned model version"),
            None => debug!(%version, "updated model version"),
        }
        Ok(updated)
    }

    /// Delete one version. Other versions keep their numbers.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if the version is absent.
    pub fn delete_model_version(&self, version: &ModelVersion) -> Result<()> {
        self.backend.write(|tx| {
            get_model_version_row(tx, version)?;
            tx.execute(
                "DELETE FROM model_versions WHERE name = ? AND version = ?",
                &[SqlParam::Text(&version.name), SqlParam::Int(version.version)],
            )?;
            touch_registered_model(tx, &version.name, now_millis())?;
            Ok(())
        })?;
        info!(%version, "deleted model version");
        Ok(())
    }

    /// Full snapshot of one version.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if absent, [`RegistryError::InvalidState`]
    /// on duplicate rows.
    pub fn get_model_version_details(&self, version: &ModelVersion) -> Result<ModelVersionDetailed> {
        debug!(%version, "get model version details");
        self.backend
            .read(|tx| get_model_version_row(tx, version)?.to_detailed_entity())
    }

    /// The stored artifact location, verbatim.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if the version is absent.
    pub fn get_model_version_download_uri(&self, version: &ModelVersion) -> Result<String> {
        debug!(%version, "get model version download uri");
        self.backend
            .read(|tx| Ok(get_model_version_row(tx, version)?.source))
    }

    /// Versions matching a single-equality filter, or all versions for an
    /// empty filter.
    ///
    /// Results always fit in one page; `next_page_token` is `None`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] for any filter outside the
    /// supported shapes.
    pub fn search_model_versions(&self, filter: &str) -> Result<PagedList<ModelVersionDetailed>> {
        let filter = ModelVersionFilter::parse(Some(filter))?;
        let versions = self.backend.read(|tx| {
            let rows = match filter.condition() {
                Some((column, value)) => tx.query_versions(
                    &format!(
                        "SELECT {MODEL_VERSION_COLUMNS} FROM model_versions
                         WHERE {column} = ? ORDER BY name, version"
                    ),
                    &[SqlParam::Text(value)],
                )?,
                None => tx.query_versions(
                    &format!(
                        "SELECT {MODEL_VERSION_COLUMNS} FROM model_versions ORDER BY name, version"
                    ),
                    &[],
                )?,
            };
            rows.iter()
                .map(SqlModelVersion::to_detailed_entity)
                .collect::<Result<Vec<_>>>()
        })?;
        debug!(?filter, count = versions.len(), "searched model versions");
        Ok(PagedList::single_page(versions))
    }
}

/// Run `attempt` until it succeeds, fails for a reason other than a
/// constraint violation, or `attempts` tries have been used.
pub(crate) fn retry_on_conflict<T>(
    attempts: u32,
    name: &str,
    mut attempt: impl FnMut() -> Result<T>,
) -> Result<T> {
    for tried in 1..=attempts {
        match attempt() {
            Err(err) if err.is_conflict() => {
                let remaining = attempts - tried;
                info!(
                    model = name,
                    remaining,
                    error = %err,
                    "Model Version creation error (name={name}) Retrying {remaining} more time{}.",
                    if remaining == 1 { "" } else { "s" }
                );
            }
            other => return other,
        }
    }
    warn!(model = name, attempts, "giving up on model version creation");
    Err(RegistryError::RetriesExhausted {
        name: name.to_string(),
        attempts,
    })
}

fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RegistryError::InvalidArgument(
            "Registered model name cannot be empty.".to_string(),
        ));
    }
    Ok(())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn already_exists(err: RegistryError, name: &str) -> RegistryError {
    if err.is_conflict() {
        RegistryError::AlreadyExists(format!("Registered Model (name={name}) already exists"))
    } else {
        err
    }
}

/// Collapse a lookup result: none is `NotFound`, several is `InvalidState`.
fn exactly_one<T>(
    rows: Vec<T>,
    not_found: impl FnOnce() -> String,
    duplicates: impl FnOnce(usize) -> String,
) -> Result<T> {
    let total = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), total) {
        (None, _) => Err(RegistryError::NotFound(not_found())),
        (Some(row), 1) => Ok(row),
        (Some(_), found) => Err(RegistryError::InvalidState(duplicates(found))),
    }
}

fn get_registered_model_row(tx: &mut dyn RegistryTx, name: &str) -> Result<SqlRegisteredModel> {
    let rows = tx.query_models(
        &format!("SELECT {REGISTERED_MODEL_COLUMNS} FROM registered_models WHERE name = ?"),
        &[SqlParam::Text(name)],
    )?;
    exactly_one(
        rows,
        || format!("Registered Model with name={name} not found"),
        |found| format!("Expected only 1 registered model with name={name}. Found {found}."),
    )
}

fn get_model_version_row(tx: &mut dyn RegistryTx, version: &ModelVersion) -> Result<SqlModelVersion> {
    let rows = tx.query_versions(
        &format!(
            "SELECT {MODEL_VERSION_COLUMNS} FROM model_versions WHERE name = ? AND version = ?"
        ),
        &[SqlParam::Text(&version.name), SqlParam::Int(version.version)],
    )?;
    exactly_one(
        rows,
        || {
            format!(
                "Model Version (name={}, version={}) not found",
                version.name, version.version
            )
        },
        |found| {
            format!(
                "Expected only 1 model version with (name={}, version={}). Found {found}.",
                version.name, version.version
            )
        },
    )
}

fn load_versions(tx: &mut dyn RegistryTx, name: &str) -> Result<Vec<SqlModelVersion>> {
    tx.query_versions(
        &format!(
            "SELECT {MODEL_VERSION_COLUMNS} FROM model_versions WHERE name = ? ORDER BY version"
        ),
        &[SqlParam::Text(name)],
    )
}

fn touch_registered_model(tx: &mut dyn RegistryTx, name: &str, now: i64) -> Result<()> {
    tx.execute(
        "UPDATE registered_models SET last_updated_time = ? WHERE name = ?",
        &[SqlParam::Int(now), SqlParam::Text(name)],
    )?;
    Ok(())
}
