//! QueryGate Test Utilities
//!
//! Shared test infrastructure for the QueryGate workspace:
//! - Proptest generators for identifiers, operations, parameters and turns
//! - Fixtures wiring stores to a manual clock
//! - Assertions for the error classes and turn sequences

pub use querygate_cache::{CacheConfig, CacheStats, ResponseCache};
pub use querygate_context::{ConversationConfig, ConversationContext, ConversationStore, Turn};
pub use querygate_core::{
    Clock, Fingerprint, ManualClock, QueryGateConfig, QueryGateError, QueryGateResult, SessionId,
    TenantId, Timestamp,
};

use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for QueryGate inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Generate a tenant id, including the separator and escape characters
    /// that a naive key scheme would confuse.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "[a-z0-9][a-z0-9:%._-]{0,11}"
            .prop_map(|raw| TenantId::new(raw).expect("non-blank tenant"))
    }

    /// Generate a session id.
    pub fn arb_session_id() -> impl Strategy<Value = SessionId> {
        "[a-zA-Z0-9_-]{1,24}".prop_map(|raw| SessionId::new(raw).expect("non-blank session"))
    }

    /// Generate an operation name.
    pub fn arb_operation() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("ask".to_string()),
            Just("top_products".to_string()),
            Just("orders:recent".to_string()),
            "[a-z_:]{1,16}",
        ]
    }

    /// Generate a JSON scalar.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,12}".prop_map(Value::String),
        ]
    }

    /// Generate a list of distinct parameter fields, sorted by name.
    pub fn arb_param_fields() -> impl Strategy<Value = Vec<(String, Value)>> {
        prop::collection::btree_map("[a-z]{1,8}", arb_param_value(), 0..6)
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// Generate a parameter value: a scalar, a short array, or a nested object.
    pub fn arb_param_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(2, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    /// Generate a parameter object.
    pub fn arb_params() -> impl Strategy<Value = Value> {
        arb_param_fields().prop_map(object_from)
    }

    /// Generate a question/answer pair.
    pub fn arb_turn_text() -> impl Strategy<Value = (String, String)> {
        ("[ -~]{1,40}", "[ -~]{0,80}")
    }

    /// Build a JSON object from fields, inserting them in the given order.
    pub fn object_from(fields: Vec<(String, Value)>) -> Value {
        let mut map = Map::new();
        for (key, value) in fields {
            map.insert(key, value);
        }
        Value::Object(map)
    }

    /// Render fields as JSON text in the given order, then parse it back, so
    /// the resulting object saw its keys in exactly that order.
    pub fn object_from_text(fields: &[(String, Value)]) -> Value {
        let body: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), value))
            .collect();
        serde_json::from_str(&format!("{{{}}}", body.join(",")))
            .expect("generated JSON object parses")
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;

    /// A manual clock frozen at the current time.
    pub fn manual_clock() -> ManualClock {
        ManualClock::starting_now()
    }

    /// Master config with the given TTL and history bound. The context
    /// window is clamped to the bound.
    pub fn test_config(ttl_secs: u64, max_turns: usize) -> QueryGateConfig {
        QueryGateConfig {
            ttl_seconds: ttl_secs,
            max_turns_per_session: max_turns,
            context_window: max_turns.min(querygate_core::DEFAULT_CONTEXT_WINDOW),
            ..Default::default()
        }
    }

    /// A JSON response cache driven by a manual clock.
    pub fn cache_with_clock(ttl: Duration) -> (ResponseCache, ManualClock) {
        let clock = manual_clock();
        let cache = ResponseCache::with_clock(
            CacheConfig::new().with_ttl(ttl),
            Arc::new(clock.clone()),
        )
        .expect("valid cache config");
        (cache, clock)
    }

    /// A conversation store driven by a manual clock.
    pub fn store_with_clock(
        max_turns: usize,
        context_window: usize,
    ) -> (ConversationStore, ManualClock) {
        let clock = manual_clock();
        let store = ConversationStore::with_clock(
            ConversationConfig::new()
                .with_max_turns(max_turns)
                .with_context_window(context_window),
            Arc::new(clock.clone()),
        )
        .expect("valid conversation config");
        (store, clock)
    }

    pub fn tenant(raw: &str) -> TenantId {
        TenantId::new(raw).expect("valid tenant")
    }

    pub fn session(raw: &str) -> SessionId {
        SessionId::new(raw).expect("valid session id")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for QueryGate-specific validation.

    use super::*;

    /// Assert that a result failed with an InvalidArgument-class error.
    #[track_caller]
    pub fn assert_invalid_argument<T: std::fmt::Debug>(result: &QueryGateResult<T>) {
        match result {
            Err(err) if err.is_invalid_argument() => {}
            other => panic!("Expected InvalidArgument error, got: {:?}", other),
        }
    }

    /// Assert that turns hold exactly these question/answer pairs, in order.
    #[track_caller]
    pub fn assert_turns(turns: &[Turn], expected: &[(&str, &str)]) {
        let actual: Vec<(&str, &str)> = turns
            .iter()
            .map(|t| (t.question.as_str(), t.answer.as_str()))
            .collect();
        assert_eq!(actual, expected, "turn sequence mismatch");
    }

    /// Assert that turn timestamps never go backwards.
    #[track_caller]
    pub fn assert_chronological(turns: &[Turn]) {
        for pair in turns.windows(2) {
            assert!(
                pair[0].timestamp <= pair[1].timestamp,
                "turns out of order: {:?} after {:?}",
                pair[1].timestamp,
                pair[0].timestamp
            );
        }
    }
}
