//! Deep structural equality for JSON values
//!
//! Used to suppress redundant reactive callbacks: a re-evaluated query only
//! reaches its subscriber when the result actually changed. Numbers compare
//! by numeric value (`1` equals `1.0`), and NaN equals NaN so a result
//! containing one does not re-fire forever.

use serde_json::Value;

/// Structural equality over two JSON values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                return i == j;
            }
            if let (Some(i), Some(j)) = (x.as_u64(), y.as_u64()) {
                return i == j;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(i), Some(j)) => i == j || (i.is_nan() && j.is_nan()),
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| deep_equal(x, y)).unwrap_or(false))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn primitives() {
        assert!(deep_equal(&json!(null), &json!(null)));
        assert!(deep_equal(&json!(true), &json!(true)));
        assert!(deep_equal(&json!("a"), &json!("a")));
        assert!(!deep_equal(&json!("a"), &json!("b")));
        assert!(!deep_equal(&json!(null), &json!(false)));
        assert!(!deep_equal(&json!(0), &json!(false)));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(deep_equal(&json!(-3), &json!(-3.0)));
        assert!(!deep_equal(&json!(1), &json!(2)));
        assert!(deep_equal(&json!(u64::MAX), &json!(u64::MAX)));
    }

    #[test]
    fn arrays_elementwise() {
        assert!(deep_equal(&json!([1, [2, 3]]), &json!([1, [2, 3]])));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!deep_equal(&json!([1]), &json!([1, 1])));
    }

    #[test]
    fn objects_by_keys_and_values() {
        assert!(deep_equal(
            &json!({"a": 1, "b": {"c": [true]}}),
            &json!({"b": {"c": [true]}, "a": 1}),
        ));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn mixed_containers() {
        let a = json!({"rows": [{"id": 1, "tags": ["x"]}], "total": 1});
        let b = json!({"rows": [{"id": 1, "tags": ["x"]}], "total": 1});
        let c = json!({"rows": [{"id": 1, "tags": ["y"]}], "total": 1});
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn reflexive(v in arb_json()) {
            prop_assert!(deep_equal(&v, &v));
        }

        #[test]
        fn symmetric(a in arb_json(), b in arb_json()) {
            prop_assert_eq!(deep_equal(&a, &b), deep_equal(&b, &a));
        }

        #[test]
        fn clone_round_trip(v in arb_json()) {
            let copy: Value = serde_json::from_str(&serde_json::to_string(&v).unwrap()).unwrap();
            prop_assert!(deep_equal(&v, &copy));
        }
    }
}
