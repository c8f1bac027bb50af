use formrules::*;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

/// Fields `f0..=fdepth`, each conditional on its predecessor, declared last
/// to first so every link costs the resolver one more sweep.
fn reversed_chain(depth: usize) -> (Value, Value) {
    let mut rules = Map::new();
    let mut data = Map::new();
    for i in (0..=depth).rev() {
        let name = format!("f{}", i);
        let row = if i == 0 {
            json!(["integer"])
        } else {
            json!(["integer", {"when": [format!("f{}", i - 1), "exists"]}])
        };
        rules.insert(name.clone(), row);
        data.insert(name, json!(i));
    }
    (Value::Object(rules), Value::Object(data))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chains_within_budget_resolve(budget in 1usize..8, depth_seed in any::<usize>()) {
        let depth = depth_seed % budget + 1;
        let (rules, data) = reversed_chain(depth);
        let rule = normalize(&rules).expect("chain schema should normalize");
        let cache = resolve(&rule, &data, budget);

        for i in 0..depth {
            let path = DataPath::parse(&format!("/f{}", i));
            let record = cache.get(&path).expect("referenced field should be cached");
            prop_assert!(record.is_resolved(), "{} unresolved with budget {}", path, budget);
        }
        prop_assert!(cache.sweeps() <= budget);
    }

    #[test]
    fn chains_validate_end_to_end(depth in 1usize..3) {
        let (rules, data) = reversed_chain(depth);
        let validator = FormValidator::new(&rules).expect("chain schema should normalize");
        let report = validator.validate(&data, &FileMap::new());
        prop_assert!(report.is_success(), "errors: {:?}", report.errors());
        prop_assert_eq!(&report.data, &data);
    }

    #[test]
    fn cycles_stop_at_the_budget(budget in 1usize..10) {
        let rules = json!({
            "obj": {"type": "object", "fields": {"x": ["string"]}, "when": ["obj/x", "exists"]},
        });
        let data = json!({"obj": {"x": "a"}});
        let rule = normalize(&rules).expect("cycle schema should normalize");
        let cache = resolve(&rule, &data, budget);

        let record = cache.get(&DataPath::parse("/obj/x")).expect("cycle member should be cached");
        prop_assert!(!record.is_resolved());
        prop_assert_eq!(cache.sweeps(), budget);
    }

    // Sibling references stay within the parent of the referencing field.
    #[test]
    fn sibling_reference_replaces_last_segment(
        parents in prop::collection::vec("[a-z]{1,5}", 0..4),
        field in "[a-z]{1,5}",
        sibling in "[a-z]{1,5}",
    ) {
        let mut from = DataPath::root();
        for parent in &parents {
            from = from.field(parent);
        }
        let expected = from.field(&sibling);
        prop_assert_eq!(from.field(&field).resolve_reference(&sibling), expected);
    }

    // `../` from inside an element lands beside the collection.
    #[test]
    fn parent_reference_skips_element_index(
        collection in "[a-z]{1,5}",
        index in 0usize..20,
        field in "[a-z]{1,5}",
        target in "[a-z]{1,5}",
    ) {
        let from = DataPath::root().field(&collection).index(index).field(&field);
        let resolved = from.resolve_reference(&format!("../{}", target));
        prop_assert_eq!(resolved, DataPath::root().field(&target));
    }
}
