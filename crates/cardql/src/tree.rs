//! Forest assembly from flat rows
//!
//! Rows are linked to their parent through a parent path whose value is the
//! parent's identifier. Identifiers are compared by their text form, so `1`
//! and `"1"` name the same node.

use serde::de;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tracing::warn;

use crate::query::ReadOptions;
use crate::types::{Record, Value};

/// Options of a tree read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeOptions {
    /// Equality constraints selecting the roots; `None` makes every record
    /// without a resolvable parent a root
    pub root: Option<Record>,
    /// Underlying read
    pub read: ReadOptions,
}

impl TreeOptions {
    /// Tree read over `read` with parentless roots
    pub fn new(read: impl Into<ReadOptions>) -> Self {
        Self {
            root: None,
            read: read.into(),
        }
    }

    /// Select roots by equality constraints
    pub fn with_root(mut self, root: Record) -> Self {
        self.root = Some(root);
        self
    }
}

impl<'de> Deserialize<'de> for TreeOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut raw = serde_json::Value::deserialize(deserializer)?;
        let root = match raw.as_object_mut().and_then(|m| m.remove("root")) {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(Record::deserialize(value).map_err(de::Error::custom)?),
        };
        let read = ReadOptions::deserialize(raw).map_err(de::Error::custom)?;
        Ok(Self { root, read })
    }
}

fn node_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn matches_root(record: &Record, root: &Record) -> bool {
    root.entries().iter().all(|(path, expected)| {
        record
            .get(path)
            .unwrap_or(&Value::Null)
            .loose_eq(expected)
    })
}

/// Arrange `records` into a forest through `parent_path`.
///
/// Children keep input order. With a root predicate, a record matching it is
/// emitted as a root even when it is also nested under its parent. A record
/// is never nested inside one of its own descendants.
pub fn assemble(records: Vec<Record>, parent_path: &str, root: Option<&Record>) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if let Some(key) = record.id().and_then(node_key) {
            index.insert(key, i);
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let parent = record
            .get(parent_path)
            .and_then(node_key)
            .and_then(|key| index.get(&key).copied());

        match parent {
            Some(p) => children[p].push(i),
            None if root.is_none() => roots.push(i),
            None => {}
        }

        if root.is_some_and(|r| matches_root(record, r)) {
            roots.push(i);
        }
    }

    let mut ancestors = Vec::new();
    roots
        .into_iter()
        .map(|i| build(i, &records, &children, &mut ancestors))
        .collect()
}

fn build(
    i: usize,
    records: &[Record],
    children: &[Vec<usize>],
    ancestors: &mut Vec<usize>,
) -> Record {
    let mut node = records[i].clone();
    ancestors.push(i);
    for &child in &children[i] {
        if ancestors.contains(&child) {
            warn!(id = ?records[child].id(), "ancestry cycle, child skipped");
            continue;
        }
        node.push_child(build(child, records, children, ancestors));
    }
    ancestors.pop();
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent: Option<i64>) -> Record {
        Record::new().with("ID", id).with("parent", parent)
    }

    fn ids(records: &[Record]) -> Vec<Value> {
        records.iter().filter_map(|r| r.id().cloned()).collect()
    }

    #[test]
    fn test_single_root_keeps_child_order() {
        let forest = assemble(
            vec![node(1, None), node(2, Some(1)), node(3, Some(1))],
            "parent",
            None,
        );
        assert_eq!(forest.len(), 1);
        assert_eq!(ids(&forest), vec![Value::Int64(1)]);
        let children = forest[0].children().unwrap();
        assert_eq!(ids(children), vec![Value::Int64(2), Value::Int64(3)]);
        assert!(children[0].children().is_none());
    }

    #[test]
    fn test_nesting_is_deep() {
        let forest = assemble(
            vec![node(3, Some(2)), node(1, None), node(2, Some(1))],
            "parent",
            None,
        );
        assert_eq!(ids(&forest), vec![Value::Int64(1)]);
        let level2 = forest[0].children().unwrap();
        assert_eq!(ids(level2[0].children().unwrap()), vec![Value::Int64(3)]);
    }

    #[test]
    fn test_ids_compare_by_text() {
        let records = vec![
            Record::new().with("ID", "7").with("parent", Value::Null),
            Record::new().with("ID", "8").with("parent", 7i64),
        ];
        let forest = assemble(records, "parent", None);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children().map(<[Record]>::len), Some(1));
    }

    #[test]
    fn test_root_predicate_allows_nested_roots() {
        let records = vec![
            node(1, None).with("kind", "dept"),
            node(2, Some(1)).with("kind", "team"),
            node(3, Some(2)).with("kind", "team"),
        ];
        let root = Record::new().with("kind", "team");
        let forest = assemble(records, "parent", Some(&root));

        assert_eq!(ids(&forest), vec![Value::Int64(2), Value::Int64(3)]);
        assert_eq!(ids(forest[0].children().unwrap()), vec![Value::Int64(3)]);
    }

    #[test]
    fn test_root_predicate_uses_loose_equality() {
        let records = vec![node(1, None), node(2, None)];
        let root = Record::new().with("ID", "2");
        let forest = assemble(records, "parent", Some(&root));
        assert_eq!(ids(&forest), vec![Value::Int64(2)]);
    }

    #[test]
    fn test_boolean_root_matches_numeric_flag() {
        let records = vec![
            Record::new().with("ID", "1").with("flag", "1"),
            Record::new().with("ID", "2").with("flag", 0i64),
        ];
        let root = Record::new().with("flag", true);
        let forest = assemble(records, "parent", Some(&root));
        assert_eq!(ids(&forest), vec![Value::from("1")]);
    }

    #[test]
    fn test_cycles_do_not_recurse() {
        let records = vec![node(1, Some(2)), node(2, Some(1)), node(3, Some(3))];
        assert!(assemble(records.clone(), "parent", None).is_empty());

        let root = Record::new().with("ID", 1i64);
        let forest = assemble(records, "parent", Some(&root));
        assert_eq!(forest.len(), 1);
        let child = &forest[0].children().unwrap()[0];
        assert_eq!(child.id(), Some(&Value::Int64(2)));
        assert!(child.children().is_none());
    }

    #[test]
    fn test_options_wire_shape() {
        let options: TreeOptions = serde_json::from_value(serde_json::json!({
            "root": {"parent": null},
            "filter": [["kind", "=", "team"]],
            "rows": 0
        }))
        .unwrap();
        assert_eq!(options.root, Some(Record::new().with("parent", Value::Null)));
        match options.read {
            ReadOptions::Query(q) => {
                assert_eq!(q.rows, 0);
                assert!(q.filter.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        let by_id: TreeOptions = serde_json::from_str(r#""A1""#).unwrap();
        assert!(by_id.root.is_none());
        assert_eq!(by_id.read, ReadOptions::Id(Value::from("A1")));
    }
}
