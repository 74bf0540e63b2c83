use mreg::RegistryError;
use mreg::entities::{ModelVersion, Stage};
use mreg::test_utils::{RegistryFixture, TestLogger};

#[test]
fn model_lifecycle_survives_reopen() {
    let mut log = TestLogger::new("model_lifecycle_survives_reopen");
    let fixture = RegistryFixture::new();

    log.step("create model and versions");
    fixture.seed_model("fraud", &[Stage::None, Stage::Staging]);
    fixture
        .store
        .update_registered_model("fraud", None, Some("card fraud scorer"))
        .unwrap();

    log.step("reopen from disk");
    let reopened = fixture.reopen().unwrap();
    let details = reopened.get_registered_model_details("fraud").unwrap();
    log.log_actual(&details);
    assert_eq!(details.model.description.as_deref(), Some("card fraud scorer"));
    assert_eq!(details.latest_versions.len(), 2);

    let next = reopened
        .create_model_version("fraud", "s3://models/fraud/2", "run-2")
        .unwrap();
    assert_eq!(next.version, 3);
    log.pass();
}

#[test]
fn latest_versions_match_stage_history() {
    let fixture = RegistryFixture::new();
    fixture.seed_model(
        "churn",
        &[Stage::None, Stage::Staging, Stage::Production, Stage::Staging],
    );

    let latest = fixture
        .store
        .get_latest_versions::<&str>("churn", &[])
        .unwrap();
    let by_stage: Vec<(Stage, i64)> = latest
        .iter()
        .map(|mv| (mv.current_stage, mv.version()))
        .collect();
    assert_eq!(by_stage, vec![(Stage::Staging, 4), (Stage::Production, 3)]);

    // Archiving the production version leaves no Production entry.
    fixture
        .store
        .update_model_version(&ModelVersion::new("churn", 3), Some("archived"), None)
        .unwrap();
    let latest = fixture
        .store
        .get_latest_versions("churn", &["Production", "Archived"])
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].current_stage, Stage::Archived);
    assert_eq!(latest[0].version(), 3);
}

#[test]
fn rename_moves_versions_and_frees_old_name() {
    let fixture = RegistryFixture::new();
    let versions = fixture.seed_model("ranker", &[Stage::Production, Stage::None]);

    fixture
        .store
        .update_registered_model("ranker", Some("ranker-v2"), None)
        .unwrap();

    for mv in &versions {
        let moved = ModelVersion::new("ranker-v2", mv.version);
        let details = fixture.store.get_model_version_details(&moved).unwrap();
        assert_eq!(details.name(), "ranker-v2");
    }
    let hits = fixture.store.search_model_versions("name = 'ranker'").unwrap();
    assert!(hits.is_empty());

    // The old name is available again and starts over at version 1.
    fixture.store.create_registered_model("ranker").unwrap();
    let fresh = fixture
        .store
        .create_model_version("ranker", "s3://fresh", "run")
        .unwrap();
    assert_eq!(fresh.version, 1);
}

#[test]
fn delete_model_cascades() {
    let fixture = RegistryFixture::new();
    let versions = fixture.seed_model("tmp", &[Stage::None, Stage::Staging, Stage::Archived]);
    fixture.seed_model("keep", &[Stage::Production]);

    fixture.store.delete_registered_model("tmp").unwrap();

    for mv in &versions {
        assert!(matches!(
            fixture.store.get_model_version_details(mv),
            Err(RegistryError::NotFound(_))
        ));
    }
    let remaining = fixture.store.search_model_versions("").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.items[0].name(), "keep");
}

#[test]
fn search_filters_and_pagination_token() {
    let fixture = RegistryFixture::new();
    fixture.seed_model("a", &[Stage::None, Stage::None]);
    fixture.seed_model("b", &[Stage::None]);

    let page = fixture.store.search_model_versions("run_id = 'run-0'").unwrap();
    assert_eq!(page.len(), 2);
    assert!(page.next_page_token.is_none());

    let page = fixture
        .store
        .search_model_versions("source_path = 's3://models/a/1'")
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.items[0].key, ModelVersion::new("a", 2));

    let err = fixture
        .store
        .search_model_versions("name = 'a' OR name = 'b'")
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));
}

#[test]
fn error_kinds_are_distinguishable() {
    let fixture = RegistryFixture::new();
    fixture.store.create_registered_model("m").unwrap();

    let not_found = fixture.store.get_registered_model_details("ghost").unwrap_err();
    let exists = fixture.store.create_registered_model("m").unwrap_err();
    let invalid = fixture.store.create_registered_model("").unwrap_err();

    assert!(matches!(not_found, RegistryError::NotFound(_)));
    assert!(matches!(exists, RegistryError::AlreadyExists(_)));
    assert!(matches!(invalid, RegistryError::InvalidArgument(_)));
    for err in [&not_found, &exists, &invalid] {
        assert!(!err.is_retryable());
    }
}
