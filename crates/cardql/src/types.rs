//! Value types for cardql
//!
//! - `Value`: a dynamically typed SQL value, bound positionally into statements
//! - `Row`: a raw driver row (ordered column names + values)
//! - `RowSet` / `ExecOutcome`: the normalized results of reads and writes
//! - `Record`: a path-keyed result or write payload, optionally carrying `children`

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// SQL value type that can hold any card column value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// Arbitrary precision decimal (NUMBER, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, CHAR, CLOB)
    String(String),
    /// Binary data (BLOB, RAW)
    Bytes(Vec<u8>),
    /// Date without time
    Date(NaiveDate),
    /// Timestamp without timezone (DATETIME, DATE with time on Oracle)
    DateTime(NaiveDateTime),
    /// List of values, used by IN and BETWEEN operands
    Array(Vec<Value>),
    /// Structured JSON that has no scalar column form
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// JavaScript-style truthiness: NULL, false, zero and the empty string are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int64(n) => *n != 0,
            Self::Float64(n) => *n != 0.0 && !n.is_nan(),
            Self::Decimal(d) => !d.is_zero(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(n) => Some(*n),
            Self::Float64(n) if n.is_finite() => Some(*n as i64),
            Self::Decimal(d) => d.to_i64(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(n) => Some(*n as f64),
            Self::Float64(n) => Some(*n),
            Self::Decimal(d) => d.to_f64(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the elements of an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Convert to owned string representation (scalars only)
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int64(n) => Some(n.to_string()),
            Self::Float64(n) => Some(n.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            _ => None,
        }
    }

    /// Loose equality in the manner of JavaScript `==`.
    ///
    /// NULL only equals NULL; numbers and booleans compare numerically
    /// (`true` is 1) against numbers, numeric strings and booleans; everything
    /// else compares by string form.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (a, b) if a.is_numeric() || b.is_numeric() => {
                match (a.numeric_form(), b.numeric_form()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
            (a, b) => match (a.as_string(), b.as_string()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int64(_) | Self::Float64(_) | Self::Decimal(_)
        )
    }

    fn numeric_form(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) if s.trim().is_empty() => Some(0.0),
            other => other.as_f64(),
        }
    }

    /// Convert to a plain JSON value
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int64(n) => J::from(*n),
            Self::Float64(n) => serde_json::Number::from_f64(*n).map_or(J::Null, J::Number),
            Self::Decimal(d) => J::String(d.to_string()),
            Self::String(s) => J::String(s.clone()),
            Self::Bytes(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            Self::Date(_) | Self::DateTime(_) => {
                self.as_string().map_or(J::Null, J::String)
            }
            Self::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Self::Json(j) => j.clone(),
        }
    }
}

/// Text form used where a value is spliced into SQL text (`LIKE` patterns).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Json(j) => write!(f, "{}", j),
            other => write!(f, "{}", other.as_string().unwrap_or_default()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int64(n) => serializer.serialize_i64(*n),
            Self::Float64(n) => serializer.serialize_f64(*n),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Json(j) => j.serialize(serializer),
            Self::Bytes(_) => self.to_json().serialize(serializer),
            other => serializer.serialize_str(&other.as_string().unwrap_or_default()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Self::Int64(i),
                None => n.as_f64().map_or(Self::Null, Self::Float64),
            },
            J::String(s) => Self::String(s),
            J::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            obj @ J::Object(_) => Self::Json(obj),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive; Oracle upper-cases aliases)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }
}

/// Normalized result of a row-returning statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in select order
    pub fields: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Create a row set
    pub fn new(fields: Vec<String>, rows: Vec<Row>) -> Self {
        Self { fields, rows }
    }

    /// Build a row set from rows, taking field names from the first row
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let fields = rows
            .first()
            .map(|r| r.columns().to_vec())
            .unwrap_or_default();
        Self { fields, rows }
    }
}

/// Normalized result of a data-modifying statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected
    pub affected: u64,
    /// Backend-generated row identifier, where the driver reports one
    pub insert_id: Option<String>,
}

impl ExecOutcome {
    /// Outcome with only an affected-row count
    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            insert_id: None,
        }
    }
}

/// A path-keyed record.
///
/// Keys keep insertion order. Tree reads attach nested records under
/// `children`, which serializes as an ordinary key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
    children: Option<Vec<Record>>,
}

/// Key used for the nested sequence on tree reads
pub const CHILDREN_KEY: &str = "children";

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(path, value);
        self
    }

    /// Get the value stored under a path
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == path)
            .map(|(_, v)| v)
    }

    /// Whether a path is present
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == path)
    }

    /// Set a path, replacing any existing value in place
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        let path = path.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == path) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((path, value)),
        }
    }

    /// Paths in insertion order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Number of entries (children excluded)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The record identifier, if present
    pub fn id(&self) -> Option<&Value> {
        self.get(crate::metadata::ID_PATH)
    }

    /// Whether the record carries a usable (truthy) identifier
    pub fn has_id(&self) -> bool {
        self.id().is_some_and(Value::is_truthy)
    }

    /// Nested children (tree reads only)
    pub fn children(&self) -> Option<&[Record]> {
        self.children.as_deref()
    }

    /// Append a child, creating the sequence on first use
    pub fn push_child(&mut self, child: Record) {
        self.children.get_or_insert_with(Vec::new).push(child);
    }

    /// Replace the children sequence
    pub fn set_children(&mut self, children: Option<Vec<Record>>) {
        self.children = children;
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.entries {
            map.insert(k.clone(), v.to_json());
        }
        if let Some(children) = &self.children {
            map.insert(
                CHILDREN_KEY.to_string(),
                serde_json::Value::Array(children.iter().map(Record::to_json).collect()),
            );
        }
        serde_json::Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.entries.len() + usize::from(self.children.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        if let Some(children) = &self.children {
            map.serialize_entry(CHILDREN_KEY, children)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a record object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Record, A::Error> {
                let mut record = Record::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == CHILDREN_KEY {
                        let children: Option<Vec<Record>> = access.next_value()?;
                        record.set_children(children);
                    } else {
                        let value: Value = access.next_value()?;
                        record.set(key, value);
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int64(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("N").is_truthy());
        assert!(Value::Int64(-1).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Null.loose_eq(&Value::Null));
        assert!(!Value::Null.loose_eq(&Value::from("")));
        assert!(Value::Int64(1).loose_eq(&Value::from("1")));
        assert!(Value::from("1.0").loose_eq(&Value::Float64(1.0)));
        assert!(Value::Bool(true).loose_eq(&Value::Int64(1)));
        assert!(Value::from("abc").loose_eq(&Value::from("abc")));
        assert!(!Value::from("abc").loose_eq(&Value::Int64(0)));
    }

    #[test]
    fn test_loose_eq_coerces_booleans() {
        assert!(Value::Bool(true).loose_eq(&Value::from("1")));
        assert!(Value::from("0").loose_eq(&Value::Bool(false)));
        assert!(Value::Bool(false).loose_eq(&Value::from("")));
        assert!(!Value::Bool(true).loose_eq(&Value::from("true")));
        assert!(!Value::Bool(true).loose_eq(&Value::Int64(2)));
        assert!(Value::Bool(true).loose_eq(&Value::Bool(true)));
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(serde_json::json!([1, "a", null, 2.5]));
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Int64(1),
                Value::from("a"),
                Value::Null,
                Value::Float64(2.5)
            ])
        );
    }

    #[test]
    fn test_display_for_pattern() {
        assert_eq!(Value::from("foo").to_string(), "foo");
        assert_eq!(Value::Int64(42).to_string(), "42");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::Array(vec![Value::Int64(1), Value::Int64(2)]).to_string(),
            "1,2"
        );
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new(vec!["C0".into(), "C1".into()], vec![1.into(), "x".into()]);
        assert_eq!(row.get_by_name("c1"), Some(&Value::from("x")));
        assert_eq!(row.get_by_name("C2"), None);
    }

    #[test]
    fn test_record_set_replaces_in_place() {
        let mut record = Record::new().with("ID", "A").with("name", "first");
        record.set("name", "second");
        assert_eq!(record.paths().collect::<Vec<_>>(), vec!["ID", "name"]);
        assert_eq!(record.get("name"), Some(&Value::from("second")));
        assert!(record.has_id());
    }

    #[test]
    fn test_record_json_keeps_order_and_children() {
        let mut parent = Record::new().with("ID", "1").with("b", 2).with("a", 1);
        parent.push_child(Record::new().with("ID", "2"));

        let text = serde_json::to_string(&parent).unwrap();
        assert_eq!(text, r#"{"ID":"1","b":2,"a":1,"children":[{"ID":"2"}]}"#);

        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, parent);
    }
}
