use proptest::prelude::*;

use mreg::entities::{ModelVersion, Stage};
use mreg::storage::RegistryStore;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Delete(usize),
    Transition(usize, Stage),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Create),
        1 => any::<usize>().prop_map(Op::Delete),
        2 => (
            any::<usize>(),
            prop_oneof![
                Just(Stage::None),
                Just(Stage::Staging),
                Just(Stage::Production),
                Just(Stage::Archived),
            ],
        )
            .prop_map(|(idx, stage)| Op::Transition(idx, stage)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn version_numbers_follow_max_plus_one(ops in prop::collection::vec(arb_op(), 1..24)) {
        let store = RegistryStore::in_memory().unwrap();
        store.create_registered_model("m").unwrap();
        let mut live: Vec<(i64, Stage)> = Vec::new();

        for op in ops {
            match op {
                Op::Create => {
                    let expected = live.iter().map(|(v, _)| *v).max().unwrap_or(0) + 1;
                    let created = store.create_model_version("m", "s3://m", "run").unwrap();
                    prop_assert_eq!(created.version, expected);
                    live.push((created.version, Stage::None));
                }
                Op::Delete(idx) if !live.is_empty() => {
                    let (version, _) = live.remove(idx % live.len());
                    store.delete_model_version(&ModelVersion::new("m", version)).unwrap();
                }
                Op::Transition(idx, stage) if !live.is_empty() => {
                    let slot = idx % live.len();
                    let key = ModelVersion::new("m", live[slot].0);
                    let updated = store.update_model_version(&key, Some(stage.as_str()), None).unwrap();
                    prop_assert_eq!(updated.current_stage, stage);
                    live[slot].1 = stage;
                }
                _ => {}
            }
        }

        // Latest-per-stage agrees with a straightforward model of the history.
        let latest = store.get_latest_versions("m", &Stage::ALL.map(|s| s.as_str())).unwrap();
        let mut expected: Vec<(Stage, i64)> = Stage::ALL
            .iter()
            .filter_map(|stage| {
                live.iter()
                    .filter(|(_, s)| s == stage)
                    .map(|(v, _)| *v)
                    .max()
                    .map(|v| (*stage, v))
            })
            .collect();
        expected.sort();
        let actual: Vec<(Stage, i64)> = latest.iter().map(|mv| (mv.current_stage, mv.version())).collect();
        prop_assert_eq!(actual, expected);
    }
}
