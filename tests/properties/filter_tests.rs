use proptest::prelude::*;

use mreg::entities::Stage;
use mreg::search::ModelVersionFilter;

fn arb_stage() -> impl Strategy<Value = Stage> {
    prop_oneof![
        Just(Stage::None),
        Just(Stage::Staging),
        Just(Stage::Production),
        Just(Stage::Archived),
    ]
}

/// Random ASCII case for each character of `text`.
fn arb_casing(text: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), text.len()).prop_map(move |flags| {
        text.chars()
            .zip(flags)
            .map(|(c, upper)| {
                if upper {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .collect()
    })
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

proptest! {
    #[test]
    fn stage_canonicalization_ignores_case(
        (stage, spelled) in arb_stage().prop_flat_map(|s| (Just(s), arb_casing(s.as_str()))),
        pad in "[ \t]{0,2}",
    ) {
        let input = format!("{pad}{spelled}{pad}");
        prop_assert_eq!(Stage::canonicalize(&input).unwrap(), stage);
    }

    #[test]
    fn unknown_stage_text_is_rejected(text in "[a-z]{1,12}") {
        prop_assume!(Stage::ALL.iter().all(|s| !s.as_str().eq_ignore_ascii_case(&text)));
        prop_assert!(Stage::canonicalize(&text).is_err());
    }

    #[test]
    fn equality_filter_preserves_value(value in "[a-zA-Z0-9 _./:'-]{0,40}") {
        let parsed = ModelVersionFilter::parse(Some(&format!("name = {}", quote(&value)))).unwrap();
        prop_assert_eq!(parsed, ModelVersionFilter::Name(value.clone()));

        let parsed = ModelVersionFilter::parse(Some(&format!("run_id={}", quote(&value)))).unwrap();
        prop_assert_eq!(parsed, ModelVersionFilter::RunId(value));
    }

    #[test]
    fn non_equality_comparators_are_rejected(
        op in prop::sample::select(vec!["!=", "<", "<=", ">", ">=", "LIKE"]),
        value in "[a-z]{1,10}",
    ) {
        let filter = format!("name {op} '{value}'");
        prop_assert!(ModelVersionFilter::parse(Some(&filter)).is_err());
    }
}
