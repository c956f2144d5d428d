use std::time::Duration;

use proptest::prelude::*;
use serde_json::{Map, Value};

use trellis::services::RetryPolicy;
use trellis::{QuerySpec, RequestKey};

fn object_from(pairs: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), Value::from(*value));
    }
    Value::Object(map)
}

proptest! {
    /// Property: filter key order never changes the request key
    ///
    /// The same pairs inserted forwards and backwards, at the top level and
    /// nested one level down, must produce identical keys.
    #[test]
    fn prop_request_key_ignores_filter_key_order(
        pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..8)
    ) {
        let forward: Vec<(String, i64)> = pairs.into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();

        let mut outer_forward = Map::new();
        outer_forward.insert("inner".to_string(), object_from(&forward));
        outer_forward.insert("flag".to_string(), Value::Bool(true));
        let mut outer_backward = Map::new();
        outer_backward.insert("flag".to_string(), Value::Bool(true));
        outer_backward.insert("inner".to_string(), object_from(&backward));

        let flat_a = RequestKey::new(&QuerySpec::new("Task").filter(object_from(&forward)), 100);
        let flat_b = RequestKey::new(&QuerySpec::new("Task").filter(object_from(&backward)), 100);
        prop_assert_eq!(flat_a, flat_b);

        let nested_a = RequestKey::new(&QuerySpec::new("Task").filter(Value::Object(outer_forward)), 100);
        let nested_b = RequestKey::new(&QuerySpec::new("Task").filter(Value::Object(outer_backward)), 100);
        prop_assert_eq!(nested_a, nested_b);
    }

    /// Property: distinct limits never collide
    #[test]
    fn prop_request_key_distinguishes_limits(a in 1u32..10_000, b in 1u32..10_000) {
        prop_assume!(a != b);
        let spec = QuerySpec::new("Garden");
        prop_assert_ne!(RequestKey::new(&spec, a), RequestKey::new(&spec, b));
    }

    /// Property: backoff stays within min(8000, 500 * 2^(k-1)) + 200
    #[test]
    fn prop_backoff_within_bounds(attempt in 1u32..=10) {
        let policy = RetryPolicy::default();
        let floor = Duration::from_millis(
            500_u64.saturating_mul(2_u64.pow(attempt - 1)).min(8_000),
        );

        let delay = policy.backoff_delay(attempt, None);
        prop_assert_eq!(policy.exponential_delay(attempt), floor);
        prop_assert!(delay >= floor);
        prop_assert!(delay <= floor + Duration::from_millis(200));
    }

    /// Property: a server hint wins over computed backoff, up to the 60s ceiling
    #[test]
    fn prop_retry_after_hint_used_up_to_ceiling(attempt in 1u32..=5, secs in 0u64..100_000) {
        let policy = RetryPolicy::default();
        prop_assert_eq!(
            policy.backoff_delay(attempt, Some(secs)),
            Duration::from_secs(secs.min(60))
        );
    }
}
