use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::storage::{DEFAULT_CREATE_MODEL_VERSION_RETRIES, DbUri, PoolOptions, RegistryOptions};
use crate::storage::session::{DEFAULT_BUSY_TIMEOUT, DEFAULT_POOL_SIZE};

/// File name of the default SQLite database under the registry root.
pub const DEFAULT_DB_FILE: &str = "registry.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

impl Config {
    /// Layer defaults, then either an explicit file (`--config` or
    /// `MREG_CONFIG`) or the global and project files, then `MREG_*`
    /// environment overrides.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env_string("MREG_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_patch(&path)? {
                Some(patch) => config.merge_patch(patch),
                None => {
                    return Err(RegistryError::MissingConfig(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Path of the per-user config file, if the platform has a config dir.
    #[must_use]
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mreg/config.toml"))
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match Self::global_path() {
            Some(path) => Self::load_patch(&path),
            None => Ok(None),
        }
    }

    fn load_project(root: &Path) -> Result<Option<ConfigPatch>> {
        let path = root.join("config.toml");
        Self::load_patch(&path)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| RegistryError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| RegistryError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.store {
            self.store.merge(patch);
        }
        if let Some(patch) = patch.registry {
            self.registry.merge(patch);
        }
        if let Some(patch) = patch.artifacts {
            self.artifacts.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("MREG_STORE_URI") {
            self.store.uri = Some(value);
        }
        if let Some(value) = env_u32("MREG_STORE_POOL_SIZE")? {
            self.store.pool_size = value;
        }
        if let Some(value) = env_u64("MREG_STORE_BUSY_TIMEOUT_MS")? {
            self.store.busy_timeout_ms = value;
        }
        if let Some(value) = env_u32("MREG_REGISTRY_CREATE_VERSION_RETRIES")? {
            self.registry.create_version_retries = value;
        }
        if let Some(value) = env_string("MREG_ARTIFACTS_ROOT") {
            self.artifacts.root = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(RegistryError::Config(
                "store.pool_size must be at least 1".to_string(),
            ));
        }
        if self.registry.create_version_retries == 0 {
            return Err(RegistryError::Config(
                "registry.create_version_retries must be at least 1".to_string(),
            ));
        }
        if let Some(uri) = &self.store.uri {
            DbUri::parse(uri)
                .map_err(|err| RegistryError::Config(format!("store.uri: {err}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection string; `None` means `sqlite:///<root>/registry.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    fn merge(&mut self, patch: StorePatch) {
        if let Some(value) = patch.uri {
            self.uri = Some(value);
        }
        if let Some(value) = patch.pool_size {
            self.pool_size = value;
        }
        if let Some(value) = patch.busy_timeout_ms {
            self.busy_timeout_ms = value;
        }
    }

    /// The configured URI, or a SQLite file under `root`.
    pub fn resolve_uri(&self, root: &Path) -> Result<DbUri> {
        match &self.uri {
            Some(raw) => DbUri::parse(raw),
            None => DbUri::parse(&format!(
                "sqlite:///{}",
                root.join(DEFAULT_DB_FILE).display()
            )),
        }
    }

    #[must_use]
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            pool_size: self.pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_create_version_retries")]
    pub create_version_retries: u32,
}

fn default_create_version_retries() -> u32 {
    DEFAULT_CREATE_MODEL_VERSION_RETRIES
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            create_version_retries: default_create_version_retries(),
        }
    }
}

impl RegistryConfig {
    fn merge(&mut self, patch: RegistryPatch) {
        if let Some(value) = patch.create_version_retries {
            self.create_version_retries = value;
        }
    }

    #[must_use]
    pub fn options(&self) -> RegistryOptions {
        RegistryOptions {
            create_version_retries: self.create_version_retries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory for uploaded artifacts; `None` means `<root>/artifacts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl ArtifactsConfig {
    fn merge(&mut self, patch: ArtifactsPatch) {
        if let Some(value) = patch.root {
            self.root = Some(value);
        }
    }

    #[must_use]
    pub fn resolve_root(&self, root: &Path) -> PathBuf {
        self.root.clone().unwrap_or_else(|| root.join("artifacts"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub store: Option<StorePatch>,
    pub registry: Option<RegistryPatch>,
    pub artifacts: Option<ArtifactsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StorePatch {
    pub uri: Option<String>,
    pub pool_size: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RegistryPatch {
    pub create_version_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ArtifactsPatch {
    pub root: Option<PathBuf>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match env_string(key) {
        Some(value) => value.trim().parse::<u32>().map(Some).map_err(|err| {
            RegistryError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env_string(key) {
        Some(value) => value.trim().parse::<u64>().map(Some).map_err(|err| {
            RegistryError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert!(config.store.uri.is_none());
        assert_eq!(config.store.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.registry.create_version_retries, 3);
        assert!(config.artifacts.root.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn config_serialization_roundtrip() {
        let mut config = Config::default();
        config.store.uri = Some("sqlite:///tmp/r.db".to_string());
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed, Config::default());
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn merge_patch_overrides_only_set_fields() {
        let mut config = Config::default();
        let patch: ConfigPatch = toml::from_str(
            r#"
            [store]
            pool_size = 8

            [registry]
            create_version_retries = 5
            "#,
        )
        .unwrap();
        config.merge_patch(patch);

        assert_eq!(config.store.pool_size, 8);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert!(config.store.uri.is_none());
        assert_eq!(config.registry.create_version_retries, 5);
    }

    #[test]
    fn later_patch_wins() {
        let mut config = Config::default();
        config.merge_patch(toml::from_str("[store]\nuri = \"sqlite:///a.db\"").unwrap());
        config.merge_patch(toml::from_str("[store]\nuri = \"sqlite:///b.db\"").unwrap());
        assert_eq!(config.store.uri.as_deref(), Some("sqlite:///b.db"));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_rejects_zero_pool() {
        let mut config = Config::default();
        config.store.pool_size = 0;
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.registry.create_version_retries = 0;
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_uri() {
        let mut config = Config::default();
        config.store.uri = Some("oracle://u@h/db".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.uri"));
    }

    #[test]
    fn validate_accepts_client_server_uri() {
        let mut config = Config::default();
        config.store.uri = Some("postgresql://ml@db/registry".to_string());
        config.validate().unwrap();
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[test]
    fn default_uri_lives_under_root() {
        let temp = TempDir::new().unwrap();
        let uri = StoreConfig::default().resolve_uri(temp.path()).unwrap();
        assert_eq!(
            uri.sqlite_target().unwrap(),
            crate::storage::SqliteTarget::File(temp.path().join(DEFAULT_DB_FILE))
        );
    }

    #[test]
    fn pool_options_carry_timeout() {
        let store = StoreConfig {
            uri: None,
            pool_size: 2,
            busy_timeout_ms: 250,
        };
        let options = store.pool_options();
        assert_eq!(options.pool_size, 2);
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn artifacts_root_defaults_under_root() {
        let root = Path::new("/srv/mreg");
        assert_eq!(
            ArtifactsConfig::default().resolve_root(root),
            root.join("artifacts")
        );
    }

    // =========================================================================
    // Files
    // =========================================================================

    #[test]
    fn load_patch_nonexistent_file() {
        let result = Config::load_patch(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_patch_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[store\npool_size = ").unwrap();
        assert!(matches!(
            Config::load_patch(&path),
            Err(RegistryError::Config(_))
        ));
    }

    #[test]
    fn load_with_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[store]\nuri = \"sqlite:///custom.db\"\n[artifacts]\nroot = \"/data/artifacts\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), temp.path()).unwrap();
        assert_eq!(config.artifacts.root, Some(PathBuf::from("/data/artifacts")));
    }

    #[test]
    fn load_with_missing_explicit_path_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing), temp.path()),
            Err(RegistryError::MissingConfig(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[registry]\ncreate_version_retries = 0\n").unwrap();
        assert!(Config::load(Some(&path), temp.path()).is_err());
    }
}
