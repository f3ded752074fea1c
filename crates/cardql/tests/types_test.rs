//! Tests for cardql values and records

use cardql::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

#[test]
fn test_record_round_trips_json_in_order() {
    let json = r#"{"ID":"A1","姓名":"张三","年龄":30,"标签":["a","b"],"备注":null}"#;
    let record: Record = serde_json::from_str(json).unwrap();

    assert_eq!(
        record.paths().collect::<Vec<_>>(),
        vec!["ID", "姓名", "年龄", "标签", "备注"]
    );
    assert_eq!(record.get("年龄"), Some(&Value::Int64(30)));
    assert_eq!(
        record.get("标签"),
        Some(&Value::Array(vec!["a".into(), "b".into()]))
    );
    assert_eq!(serde_json::to_string(&record).unwrap(), json);
}

#[test]
fn test_record_identifier_checks() {
    assert!(Record::new().with("ID", "A1").has_id());
    assert!(!Record::new().with("ID", "").has_id());
    assert!(!Record::new().with("ID", Value::Null).has_id());
    assert!(!Record::new().with("姓名", "x").has_id());
}

#[test]
fn test_record_children_serialize_last() {
    let mut parent = Record::new().with("ID", 1i64);
    parent.push_child(Record::new().with("ID", 2i64));
    let json = serde_json::to_value(&parent).unwrap();
    assert_eq!(json, serde_json::json!({"ID": 1, "children": [{"ID": 2}]}));

    let back: Record = serde_json::from_value(json).unwrap();
    assert_eq!(back, parent);
}

#[test]
fn test_loose_equality_like_scripts() {
    assert!(Value::from("1").loose_eq(&Value::Int64(1)));
    assert!(Value::Int64(1).loose_eq(&Value::Bool(true)));
    assert!(Value::Decimal(Decimal::from_str("2.50").unwrap()).loose_eq(&Value::Float64(2.5)));
    assert!(Value::Null.loose_eq(&Value::Null));
    assert!(!Value::Null.loose_eq(&Value::from("")));
    assert!(!Value::from("a").loose_eq(&Value::from("b")));
}

#[test]
fn test_truthiness() {
    for falsy in [Value::Null, Value::Bool(false), Value::Int64(0), Value::from("")] {
        assert!(!falsy.is_truthy(), "{:?}", falsy);
    }
    for truthy in [Value::Bool(true), Value::Int64(-1), Value::from("0")] {
        assert!(truthy.is_truthy(), "{:?}", truthy);
    }
}

#[test]
fn test_exec_outcome() {
    let outcome = ExecOutcome::affected(3);
    assert_eq!(outcome.affected, 3);
    assert_eq!(outcome.insert_id, None);
}
