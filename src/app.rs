//! Composition root: resolved configuration plus the collaborators commands use.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::artifacts::{ArtifactStore, LocalArtifactStore};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{DbUri, RegistryStore};

/// Directory holding the project config and the default database, relative
/// to the working directory unless `MREG_ROOT` names one.
pub const ROOT_DIR: &str = ".mreg";

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub robot_mode: bool,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("robot_mode", &self.robot_mode)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = match std::env::var_os("MREG_ROOT").filter(|v| !v.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?.join(ROOT_DIR),
        };
        let mut config = Config::load(cli.config.as_deref(), &root)?;
        if let Some(uri) = &cli.store_uri {
            config.store.uri = Some(uri.clone());
            config.validate()?;
        }
        Ok(Self::new(root, config, cli.config.clone(), cli.robot))
    }

    pub fn new(root: PathBuf, config: Config, config_path: Option<PathBuf>, robot_mode: bool) -> Self {
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.artifacts.resolve_root(&root)));
        Self {
            root,
            config,
            config_path,
            robot_mode,
            artifacts,
        }
    }

    /// Replace the artifact store, e.g. with a test double.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn store_uri(&self) -> Result<DbUri> {
        self.config.store.resolve_uri(&self.root)
    }

    /// Open the registry named by the resolved configuration.
    pub fn open_store(&self) -> Result<RegistryStore> {
        let uri = self.store_uri()?;
        debug!(uri = %uri, "opening registry store");
        RegistryStore::open(
            &uri,
            &self.config.store.pool_options(),
            &self.config.registry.options(),
        )
    }
}
