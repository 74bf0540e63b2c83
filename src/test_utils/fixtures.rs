use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::entities::{ModelVersion, Stage};
use crate::error::Result;
use crate::storage::{DbUri, PoolOptions, RegistryOptions, RegistryStore};

/// A file-backed registry in a private temp directory.
pub struct RegistryFixture {
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
    pub store: RegistryStore,
}

impl RegistryFixture {
    /// # Panics
    ///
    /// Panics if the temp directory or store cannot be created.
    pub fn new() -> Self {
        Self::with_options(&PoolOptions::default(), &RegistryOptions::default())
    }

    /// # Panics
    ///
    /// Panics if the temp directory or store cannot be created.
    pub fn with_options(pool: &PoolOptions, options: &RegistryOptions) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("registry.db");
        let uri = Self::uri_for(&db_path);
        let store = RegistryStore::open(&uri, pool, options).expect("open registry store");
        println!("[FIXTURE] Opened registry at {}", db_path.display());
        Self {
            temp_dir,
            db_path,
            store,
        }
    }

    /// `sqlite:///` URI naming `path`.
    ///
    /// # Panics
    ///
    /// Panics if the resulting URI does not parse.
    pub fn uri_for(path: &Path) -> DbUri {
        DbUri::parse(&format!("sqlite:///{}", path.display())).expect("sqlite uri")
    }

    /// Open another store over the same database file.
    pub fn reopen(&self) -> Result<RegistryStore> {
        RegistryStore::open(
            &Self::uri_for(&self.db_path),
            &PoolOptions::default(),
            &RegistryOptions::default(),
        )
    }

    /// Register `name` with one version per entry of `stages`, numbered from 1.
    ///
    /// # Panics
    ///
    /// Panics if any registry call fails.
    pub fn seed_model(&self, name: &str, stages: &[Stage]) -> Vec<ModelVersion> {
        self.store
            .create_registered_model(name)
            .expect("create registered model");
        stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| {
                let mv = self
                    .store
                    .create_model_version(name, &format!("s3://models/{name}/{idx}"), &format!("run-{idx}"))
                    .expect("create model version");
                if *stage != Stage::None {
                    self.store
                        .update_model_version(&mv, Some(stage.as_str()), None)
                        .expect("transition model version");
                }
                mv
            })
            .collect()
    }

    /// Write a file under the fixture directory.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure.
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> PathBuf {
        let full_path = self.temp_dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&full_path, content).expect("write file");
        full_path
    }
}

impl Default for RegistryFixture {
    fn default() -> Self {
        Self::new()
    }
}
