use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use mreg::RegistryError;
use mreg::storage::{PoolOptions, RegistryOptions};
use mreg::test_utils::{RegistryFixture, TestLogger};

const WRITERS: usize = 8;
const VERSIONS_PER_WRITER: usize = 5;

#[test]
fn concurrent_version_creation_assigns_unique_numbers() {
    let mut log = TestLogger::new("concurrent_version_creation_assigns_unique_numbers");
    let fixture = RegistryFixture::new();
    fixture.store.create_registered_model("shared").unwrap();
    let store = Arc::new(fixture.reopen().unwrap());
    let barrier = Arc::new(Barrier::new(WRITERS));

    log.step("spawn writers");
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..VERSIONS_PER_WRITER)
                    .map(|i| {
                        store
                            .create_model_version(
                                "shared",
                                &format!("s3://shared/{writer}/{i}"),
                                &format!("run-{writer}"),
                            )
                            .unwrap()
                            .version
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    log.step("check numbering");
    let unique: BTreeSet<i64> = all.iter().copied().collect();
    let total = (WRITERS * VERSIONS_PER_WRITER) as i64;
    assert_eq!(unique.len() as i64, total, "duplicate version numbers: {all:?}");
    assert_eq!(unique, (1..=total).collect::<BTreeSet<_>>());
    log.pass();
}

#[test]
fn separate_stores_share_one_file() {
    let fixture = RegistryFixture::new();
    fixture.store.create_registered_model("m").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = fixture.reopen().unwrap();
            thread::spawn(move || {
                store
                    .create_model_version("m", &format!("s3://m/{i}"), "run")
                    .unwrap()
                    .version
            })
        })
        .collect();

    let versions: BTreeSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(versions, (1..=4).collect::<BTreeSet<_>>());
}

#[test]
fn concurrent_duplicate_creates_leave_one_model() {
    let fixture = RegistryFixture::with_options(
        &PoolOptions {
            pool_size: 4,
            ..PoolOptions::default()
        },
        &RegistryOptions::default(),
    );
    let store = Arc::new(fixture.reopen().unwrap());
    let barrier = Arc::new(Barrier::new(6));

    let results: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.create_registered_model("contested")
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, RegistryError::AlreadyExists(_))));
    assert_eq!(fixture.store.list_registered_models().unwrap().len(), 1);
}

#[test]
fn readers_see_consistent_model_and_versions_during_rename() {
    let fixture = RegistryFixture::new();
    fixture.store.create_registered_model("a").unwrap();
    for i in 0..10 {
        fixture
            .store
            .create_model_version("a", &format!("s3://a/{i}"), "run")
            .unwrap();
    }
    let store = Arc::new(fixture.reopen().unwrap());

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..20 {
                let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
                store.update_registered_model(from, Some(to), None).unwrap();
            }
        })
    };

    for _ in 0..50 {
        let all = store.search_model_versions("").unwrap();
        let names: BTreeSet<&str> = all.iter().map(|mv| mv.name()).collect();
        assert_eq!(all.len(), 10);
        assert_eq!(names.len(), 1, "versions split across names: {names:?}");
    }
    writer.join().unwrap();
}
