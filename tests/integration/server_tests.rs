//! Registry semantics against live client-server engines.
//!
//! # Running These Tests
//!
//! ```bash
//! MREG_TEST_POSTGRES_URI=postgresql://ml:pw@localhost:5432/registry \
//! MREG_TEST_MYSQL_URI=mysql://ml:pw@localhost:3306/registry \
//!     cargo test --test integration server_ -- --nocapture
//! ```
//!
//! Each test skips when its variable is unset. Model names carry a
//! per-test prefix and are deleted on drop, so a shared database is fine.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use mreg::RegistryError;
use mreg::entities::{ModelVersion, Stage};
use mreg::storage::{DbUri, PoolOptions, RegistryOptions, RegistryStore};
use mreg::test_utils::TestLogger;

const POSTGRES_ENV: &str = "MREG_TEST_POSTGRES_URI";
const MYSQL_ENV: &str = "MREG_TEST_MYSQL_URI";

// =============================================================================
// Test Fixture
// =============================================================================

struct ServerEnv {
    store: Arc<RegistryStore>,
    prefix: String,
}

impl ServerEnv {
    /// Open the store named by `var`, or `None` when it is unset.
    fn new(var: &str, test_name: &str) -> Option<Self> {
        let Ok(raw) = std::env::var(var) else {
            eprintln!("[{test_name}] SKIP: {var} not set");
            return None;
        };
        let uri = DbUri::parse(&raw).expect("test server uri");
        let store = RegistryStore::open(
            &uri,
            &PoolOptions::default(),
            &RegistryOptions {
                create_version_retries: 10,
            },
        )
        .expect("open server store");
        Some(Self {
            store: Arc::new(store),
            prefix: format!("{test_name}-{}-", Utc::now().timestamp_micros()),
        })
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }
}

impl Drop for ServerEnv {
    fn drop(&mut self) {
        let Ok(models) = self.store.list_registered_models() else {
            return;
        };
        for model in models.iter().filter(|m| m.name.starts_with(&self.prefix)) {
            let _ = self.store.delete_registered_model(&model.name);
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

fn lifecycle(env: &ServerEnv) {
    let churn = env.name("churn");
    let renamed = env.name("churn-v2");

    env.store.create_registered_model(&churn).unwrap();
    assert!(matches!(
        env.store.create_registered_model(&churn),
        Err(RegistryError::AlreadyExists(_))
    ));

    let v1 = env.store.create_model_version(&churn, "s3://m/1", "r1").unwrap();
    let v2 = env.store.create_model_version(&churn, "s3://m/2", "r2").unwrap();
    assert_eq!((v1.version, v2.version), (1, 2));

    let staged = env
        .store
        .update_model_version(&v2, Some("production"), Some("promoted"))
        .unwrap();
    assert_eq!(staged.current_stage, Stage::Production);
    assert_eq!(staged.description.as_deref(), Some("promoted"));

    let latest = env.store.get_latest_versions::<&str>(&churn, &[]).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version(), 2);

    env.store
        .update_registered_model(&churn, Some(&renamed), Some("renamed"))
        .unwrap();
    let moved = ModelVersion::new(renamed.as_str(), 2);
    assert_eq!(
        env.store.get_model_version_download_uri(&moved).unwrap(),
        "s3://m/2"
    );
    assert!(matches!(
        env.store.get_registered_model_details(&churn),
        Err(RegistryError::NotFound(_))
    ));

    let found = env
        .store
        .search_model_versions(&format!("name = '{renamed}'"))
        .unwrap();
    assert_eq!(found.len(), 2);

    env.store.delete_model_version(&ModelVersion::new(renamed.as_str(), 1)).unwrap();
    env.store.delete_registered_model(&renamed).unwrap();
    assert!(env
        .store
        .search_model_versions(&format!("name = '{renamed}'"))
        .unwrap()
        .is_empty());
}

fn rename_conflict_keeps_both(env: &ServerEnv) {
    let a = env.name("a");
    let b = env.name("b");
    env.store.create_registered_model(&a).unwrap();
    env.store.create_registered_model(&b).unwrap();
    env.store.create_model_version(&a, "s3://a", "r").unwrap();

    let err = env.store.update_registered_model(&a, Some(&b), None).unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyExists(_)), "{err}");
    assert!(env
        .store
        .get_model_version_details(&ModelVersion::new(a.as_str(), 1))
        .is_ok());
}

fn concurrent_versions_are_unique(env: &ServerEnv, test_name: &str) {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 5;

    let mut log = TestLogger::new(test_name);
    let shared = env.name("shared");
    env.store.create_registered_model(&shared).unwrap();
    let barrier = Arc::new(Barrier::new(WRITERS));

    log.step("spawn writers");
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&env.store);
            let barrier = Arc::clone(&barrier);
            let shared = shared.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..PER_WRITER)
                    .map(|i| store.create_model_version(&shared, &format!("s3://{writer}/{i}"), "r"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    log.step("check numbering");
    let mut created = Vec::new();
    for handle in handles {
        for outcome in handle.join().unwrap() {
            match outcome {
                Ok(mv) => created.push(mv.version),
                // Lock waits and deadlocks surface as retryable failures.
                Err(err) => assert!(err.is_retryable(), "unexpected failure: {err}"),
            }
        }
    }
    let unique: BTreeSet<i64> = created.iter().copied().collect();
    assert_eq!(unique.len(), created.len(), "duplicate version numbers: {created:?}");

    let stored = env
        .store
        .search_model_versions(&format!("name = '{shared}'"))
        .unwrap();
    assert_eq!(stored.len(), created.len());
    log.pass();
}

// =============================================================================
// PostgreSQL
// =============================================================================

#[test]
fn server_postgres_lifecycle() {
    let Some(env) = ServerEnv::new(POSTGRES_ENV, "pg-lifecycle") else {
        return;
    };
    lifecycle(&env);
}

#[test]
fn server_postgres_rename_conflict() {
    let Some(env) = ServerEnv::new(POSTGRES_ENV, "pg-rename") else {
        return;
    };
    rename_conflict_keeps_both(&env);
}

#[test]
fn server_postgres_concurrent_versions() {
    let Some(env) = ServerEnv::new(POSTGRES_ENV, "pg-concurrent") else {
        return;
    };
    concurrent_versions_are_unique(&env, "server_postgres_concurrent_versions");
}

// =============================================================================
// MySQL
// =============================================================================

#[test]
fn server_mysql_lifecycle() {
    let Some(env) = ServerEnv::new(MYSQL_ENV, "my-lifecycle") else {
        return;
    };
    lifecycle(&env);
}

#[test]
fn server_mysql_rename_conflict() {
    let Some(env) = ServerEnv::new(MYSQL_ENV, "my-rename") else {
        return;
    };
    rename_conflict_keeps_both(&env);
}

#[test]
fn server_mysql_concurrent_versions() {
    let Some(env) = ServerEnv::new(MYSQL_ENV, "my-concurrent") else {
        return;
    };
    concurrent_versions_are_unique(&env, "server_mysql_concurrent_versions");
}
