//! Artifact store collaborator.
//!
//! The registry only records where artifacts live. Moving bytes is the job
//! of an [`ArtifactStore`], built once at the composition root and handed to
//! whatever needs it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{RegistryError, Result};

const FILE_SCHEME: &str = "file://";

/// Fetches and publishes model artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Resolve `uri` to a readable local path.
    fn download(&self, uri: &str) -> Result<PathBuf>;

    /// Publish `local_path` under `dest` and return its URI.
    fn upload(&self, local_path: &Path, dest: &str) -> Result<String>;
}

/// Artifacts kept on the local filesystem under one root directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(uri: &str) -> Result<PathBuf> {
        if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
            return Ok(PathBuf::from(path));
        }
        if uri.contains("://") {
            return Err(RegistryError::InvalidArgument(format!(
                "local artifact store cannot read {uri}"
            )));
        }
        Ok(PathBuf::from(uri))
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn download(&self, uri: &str) -> Result<PathBuf> {
        let path = Self::local_path(uri)?;
        if !path.exists() {
            return Err(RegistryError::NotFound(format!(
                "artifact {uri} not found at {}",
                path.display()
            )));
        }
        debug!(uri, path = %path.display(), "resolved artifact");
        Ok(path)
    }

    fn upload(&self, local_path: &Path, dest: &str) -> Result<String> {
        let dest = Path::new(dest);
        if dest.as_os_str().is_empty()
            || dest
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(RegistryError::InvalidArgument(format!(
                "artifact destination must be a relative path without '..': {}",
                dest.display()
            )));
        }
        if !local_path.is_file() {
            return Err(RegistryError::NotFound(format!(
                "artifact source {} is not a file",
                local_path.display()
            )));
        }

        let target = self.root.join(dest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local_path, &target)?;
        let target = target.canonicalize()?;
        debug!(from = %local_path.display(), to = %target.display(), "uploaded artifact");
        Ok(format!("{FILE_SCHEME}{}", target.display()))
    }
}
