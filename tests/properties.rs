//! Property tests for parameter stores, deferred binding and path matching.

use proptest::prelude::*;
use rewrite_engine::bind::{IntegerValidator, Value};
use rewrite_engine::condition::{Condition, Path};
use rewrite_engine::context::commit;
use rewrite_engine::param::{Parameter, ParameterBuilder, ParameterStore};
use rewrite_engine::{EvaluationContext, HttpRewrite, RequestInfo, ResponseInfo, Rewrite};
use std::sync::Arc;

// Strategy: parameter names accepted by the placeholder grammar
fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z_][a-z0-9_]{0,8}").unwrap()
}

// Strategy: a matched value that is either numeric or not
fn arb_value() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[0-9]{1,6}").unwrap(),
        prop::string::string_regex("[a-z]{1,6}").unwrap(),
    ]
}

fn make_event(uri: &str) -> HttpRewrite {
    HttpRewrite::new(RequestInfo::new("GET", uri), ResponseInfo::new())
}

proptest! {
    /// Property: a store hands out the same parameter for every lookup of a name
    #[test]
    fn proptest_store_lookup_is_stable(names in prop::collection::vec(arb_name(), 1..8)) {
        let mut store = ParameterStore::for_pattern("/test");
        for name in &names {
            store.register(name);
        }

        for name in &names {
            let first = store.get(name).unwrap().clone();
            let second = store.get(name).unwrap();
            prop_assert!(Arc::ptr_eq(&first, second));
            prop_assert_eq!(first.name(), name.as_str());
        }

        let mut distinct = names.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(store.len(), distinct.len());
    }

    /// Property: looking up an unregistered name is a configuration error
    #[test]
    fn proptest_unknown_name_is_rejected(
        names in prop::collection::vec(arb_name(), 0..5),
        missing in arb_name()
    ) {
        prop_assume!(!names.contains(&missing));
        let mut store = ParameterStore::for_pattern("/{known}");
        for name in &names {
            store.register(name);
        }

        let err = store.get(&missing).unwrap_err();
        prop_assert!(err.is_configuration());
        prop_assert!(err.to_string().contains(&missing));
    }

    /// Property: a commit binds every value or none of them
    #[test]
    fn proptest_commit_is_all_or_nothing(values in prop::collection::vec(arb_value(), 1..6)) {
        let mut event = make_event("/");
        let mut context = EvaluationContext::new();

        for (i, value) in values.iter().enumerate() {
            let parameter = Arc::new(Parameter::new(format!("p{}", i)));
            parameter.validated_by(IntegerValidator);
            context.enqueue_submission(parameter, Value::from(value.as_str()));
        }

        let pending = context.take_pending();
        let committed = commit(&mut event, &context, pending).unwrap();
        let all_numeric = values.iter().all(|v| v.chars().all(|c| c.is_ascii_digit()));

        prop_assert_eq!(committed, all_numeric);
        if committed {
            prop_assert_eq!(event.attributes().len(), values.len());
        } else {
            prop_assert!(event.attributes().is_empty());
        }
    }

    /// Property: a single-segment placeholder captures the segment verbatim
    #[test]
    fn proptest_path_captures_segment(
        prefix in prop::string::string_regex("[a-z]{1,6}").unwrap(),
        segment in prop::string::string_regex("[A-Za-z0-9._~-]{1,12}").unwrap()
    ) {
        let condition = Path::matches(&format!("/{}/{{value}}", prefix)).unwrap();
        let event = make_event(&format!("/{}/{}", prefix, segment));
        let mut context = EvaluationContext::new();

        prop_assert!(condition.evaluate(&event, &mut context).unwrap());
        prop_assert_eq!(context.pending().len(), 1);
        prop_assert_eq!(context.pending()[0].value(), &Value::from(segment.as_str()));

        let nested = make_event(&format!("/{}/{}/extra", prefix, segment));
        let mut context = EvaluationContext::new();
        prop_assert!(!condition.evaluate(&nested, &mut context).unwrap());
        prop_assert!(context.pending().is_empty());
    }
}
