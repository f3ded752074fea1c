//! Filter trees and their compilation to SQL predicates
//!
//! Wire shape:
//!
//! ```json
//! { "and": [ ["age", ">", 18], ["name", "like", "foo"], { "or": [ ... ] } ] }
//! ```
//!
//! A bare array is shorthand for `{ "and": [...] }`. When one object carries
//! both `and` and `or`, each part is compiled on its own and the parts are
//! joined with `AND`.
//!
//! Parameters are collected depth-first, left to right, matching placeholder
//! order. `LIKE` operands are spliced into the SQL text as a quoted literal
//! (quotes escaped, wildcards kept), everything else is bound.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::query::ColumnMap;
use crate::types::Value;

/// Connective of a filter group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    /// All conditions hold
    And,
    /// Any condition holds
    Or,
}

impl Logic {
    fn joiner(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }
}

/// A `[path, operator, value]` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    /// Model path
    pub path: String,
    /// Operator as written by the caller
    pub operator: String,
    /// Operand
    pub value: Value,
}

impl Triple {
    /// Create a condition
    pub fn new(
        path: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// Member of a filter group
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Leaf condition
    Triple(Triple),
    /// Nested filter, parenthesized when compiled
    Nested(Filter),
}

/// A filter tree node: one or more connective groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    groups: Vec<(Logic, Vec<Condition>)>,
}

impl Filter {
    /// Empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a single `and` group
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            groups: vec![(Logic::And, conditions)],
        }
    }

    /// Filter with a single `or` group
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            groups: vec![(Logic::Or, conditions)],
        }
    }

    /// Add another group at this level
    pub fn with_group(mut self, logic: Logic, conditions: Vec<Condition>) -> Self {
        self.groups.push((logic, conditions));
        self
    }

    /// Shorthand for `{and: [[ID, '=', id]]}`
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::and(vec![Condition::Triple(Triple::new(
            crate::metadata::ID_PATH,
            "=",
            id,
        ))])
    }

    /// Whether the filter has no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every path referenced by the tree, in placeholder order
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        for (_, conditions) in &self.groups {
            for condition in conditions {
                match condition {
                    Condition::Triple(t) => out.push(t.path.as_str()),
                    Condition::Nested(f) => f.collect_paths(out),
                }
            }
        }
    }
}

impl From<Triple> for Condition {
    fn from(t: Triple) -> Self {
        Self::Triple(t)
    }
}

impl From<Filter> for Condition {
    fn from(f: Filter) -> Self {
        Self::Nested(f)
    }
}

/// Supported comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `<>`
    Ne,
    /// `IS [NOT] NULL`, by operand truthiness
    Is,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
    /// `LIKE '%..%'`
    Like,
    /// `NOT LIKE '%..%'`
    NotLike,
    /// `BETWEEN ? AND ?`
    Between,
    /// `NOT BETWEEN ? AND ?`
    NotBetween,
}

impl Operator {
    /// Parse an operator, ignoring case and extra inner whitespace
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        let op = match normalized.as_str() {
            "=" => Self::Eq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "<>" => Self::Ne,
            "IS" => Self::Is,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "BETWEEN" => Self::Between,
            "NOT BETWEEN" => Self::NotBetween,
            _ => return Err(Error::unsupported_operator(raw)),
        };
        Ok(op)
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Ne => "<>",
            Self::Is => "IS",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
        }
    }
}

/// Predicate text plus bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Canonical SQL predicate (no leading `WHERE`)
    pub sql: String,
    /// Parameters in placeholder order
    pub params: Vec<Value>,
}

/// Compile a filter tree; `None` when it yields no predicate
pub fn compile(
    filter: &Filter,
    columns: &ColumnMap,
    dialect: &dyn SqlDialect,
) -> Result<Option<CompiledFilter>> {
    let mut parts: Vec<CompiledFilter> = Vec::new();

    for (logic, conditions) in &filter.groups {
        let mut texts = Vec::with_capacity(conditions.len());
        let mut params = Vec::new();

        for condition in conditions {
            match condition {
                Condition::Triple(triple) => {
                    let compiled = compile_triple(triple, columns, dialect)?;
                    texts.push(compiled.sql);
                    params.extend(compiled.params);
                }
                Condition::Nested(nested) => {
                    if let Some(compiled) = compile(nested, columns, dialect)? {
                        texts.push(format!("({})", compiled.sql));
                        params.extend(compiled.params);
                    }
                }
            }
        }

        if !texts.is_empty() {
            parts.push(CompiledFilter {
                sql: texts.join(logic.joiner()),
                params,
            });
        }
    }

    match parts.len() {
        0 => Ok(None),
        1 => Ok(parts.pop()),
        _ => {
            let sql = parts
                .iter()
                .map(|p| format!("({})", p.sql))
                .collect::<Vec<_>>()
                .join(" AND ");
            let params = parts.into_iter().flat_map(|p| p.params).collect();
            Ok(Some(CompiledFilter { sql, params }))
        }
    }
}

fn compile_triple(
    triple: &Triple,
    columns: &ColumnMap,
    dialect: &dyn SqlDialect,
) -> Result<CompiledFilter> {
    let operator = Operator::parse(&triple.operator)?;
    let column = &columns.get(&triple.path)?.column;
    let value = &triple.value;

    let compiled = match operator {
        Operator::Eq | Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le | Operator::Ne => {
            CompiledFilter {
                sql: format!("{}{}?", column, operator.symbol()),
                params: vec![value.clone()],
            }
        }
        Operator::Is => CompiledFilter {
            sql: if value.is_truthy() {
                format!("{} IS NOT NULL", column)
            } else {
                format!("{} IS NULL", column)
            },
            params: Vec::new(),
        },
        Operator::In | Operator::NotIn => {
            let items = value.as_array().ok_or_else(|| {
                Error::invalid_argument(format!(
                    "{} on '{}' needs an array operand",
                    operator.symbol(),
                    triple.path
                ))
            })?;
            if items.is_empty() {
                // `IN ()` is not valid SQL; an empty list matches nothing
                let sql = if operator == Operator::In { "1=0" } else { "1=1" };
                CompiledFilter {
                    sql: sql.to_string(),
                    params: Vec::new(),
                }
            } else {
                let slots = vec!["?"; items.len()].join(",");
                CompiledFilter {
                    sql: format!("{} {} ({})", column, operator.symbol(), slots),
                    params: items.to_vec(),
                }
            }
        }
        Operator::Like | Operator::NotLike => CompiledFilter {
            sql: format!(
                "{} {} '%{}%'",
                column,
                operator.symbol(),
                dialect.escape_string(&value.to_string())
            ),
            params: Vec::new(),
        },
        Operator::Between | Operator::NotBetween => match value.as_array() {
            Some([low, high]) => CompiledFilter {
                sql: format!("{} {} ? AND ?", column, operator.symbol()),
                params: vec![low.clone(), high.clone()],
            },
            _ => {
                return Err(Error::invalid_argument(format!(
                    "{} on '{}' needs a two-element array operand",
                    operator.symbol(),
                    triple.path
                )))
            }
        },
    };

    Ok(compiled)
}

// ===========================================================================
// Wire format
// ===========================================================================

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = Filter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a filter object with 'and'/'or' keys, or an array of conditions")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Filter, A::Error> {
                let mut filter = Filter::new();
                while let Some(key) = access.next_key::<String>()? {
                    match Logic::from_key(&key) {
                        Some(logic) => {
                            let conditions: Vec<Condition> = access.next_value()?;
                            filter.groups.push((logic, conditions));
                        }
                        None => {
                            access.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(filter)
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Filter, A::Error> {
                let mut conditions = Vec::new();
                while let Some(condition) = access.next_element::<Condition>()? {
                    conditions.push(condition);
                }
                Ok(Filter::and(conditions))
            }
        }

        deserializer.deserialize_any(FilterVisitor)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ConditionVisitor;

        impl<'de> Visitor<'de> for ConditionVisitor {
            type Value = Condition;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [path, operator, value] triple or a nested filter object")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Condition, A::Error> {
                let path: String = access
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let operator: String = access
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                // `IS` may omit its operand
                let value: Value = access.next_element()?.unwrap_or_default();
                if access.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(Condition::Triple(Triple {
                    path,
                    operator,
                    value,
                }))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                access: A,
            ) -> std::result::Result<Condition, A::Error> {
                Filter::deserialize(de::value::MapAccessDeserializer::new(access))
                    .map(Condition::Nested)
            }
        }

        deserializer.deserialize_any(ConditionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, OracleDialect};
    use crate::query::ColumnRef;

    fn columns() -> ColumnMap {
        let mut map = ColumnMap::new("人员");
        map.insert("age", ColumnRef::new("T0.NL", "Number"));
        map.insert("name", ColumnRef::new("T0.MC", "Text"));
        map.insert("dept.name", ColumnRef::new("T1.MC", "Text"));
        map
    }

    fn compile_json(json: serde_json::Value) -> Result<Option<CompiledFilter>> {
        let filter: Filter = serde_json::from_value(json).unwrap();
        compile(&filter, &columns(), &MySqlDialect)
    }

    #[test]
    fn test_and_with_like() {
        let compiled = compile_json(serde_json::json!({
            "and": [["age", ">", 18], ["name", "LIKE", "foo"]]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(compiled.sql, "T0.NL>? AND T0.MC LIKE '%foo%'");
        assert_eq!(compiled.params, vec![Value::Int64(18)]);
    }

    #[test]
    fn test_nested_groups_keep_parameter_order() {
        let compiled = compile_json(serde_json::json!({
            "or": [
                ["age", "between", [1, 9]],
                {"and": [["name", "in", ["a", "b"]], ["dept.name", "<>", "x"]]},
                ["age", "=", 42]
            ]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            compiled.sql,
            "T0.NL BETWEEN ? AND ? OR (T0.MC IN (?,?) AND T1.MC<>?) OR T0.NL=?"
        );
        assert_eq!(
            compiled.params,
            vec![
                Value::Int64(1),
                Value::Int64(9),
                Value::from("a"),
                Value::from("b"),
                Value::from("x"),
                Value::Int64(42)
            ]
        );
    }

    #[test]
    fn test_sibling_groups_are_conjoined() {
        let compiled = compile_json(serde_json::json!({
            "and": [["age", ">=", 1]],
            "or": [["name", "=", "a"], ["name", "=", "b"]]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(compiled.sql, "(T0.NL>=?) AND (T0.MC=? OR T0.MC=?)");
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn test_bare_array_is_and() {
        let compiled = compile_json(serde_json::json!([["age", "<", 3], ["age", ">", 1]]))
            .unwrap()
            .unwrap();
        assert_eq!(compiled.sql, "T0.NL<? AND T0.NL>?");
    }

    #[test]
    fn test_is_uses_truthiness() {
        let compiled = compile_json(serde_json::json!({
            "and": [["name", "is", null], ["age", "IS", true], ["dept.name", "is"]]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            compiled.sql,
            "T0.MC IS NULL AND T0.NL IS NOT NULL AND T1.MC IS NULL"
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_not_variants() {
        let compiled = compile_json(serde_json::json!({
            "and": [
                ["name", "not like", "x"],
                ["age", "NOT  IN", [1]],
                ["age", "not between", [1, 2]]
            ]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            compiled.sql,
            "T0.MC NOT LIKE '%x%' AND T0.NL NOT IN (?) AND T0.NL NOT BETWEEN ? AND ?"
        );
    }

    #[test]
    fn test_like_escapes_quotes() {
        let filter = Filter::and(vec![Triple::new("name", "like", "O'Brien").into()]);
        let compiled = compile(&filter, &columns(), &OracleDialect).unwrap().unwrap();
        assert_eq!(compiled.sql, "T0.MC LIKE '%O''Brien%'");
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let compiled = compile_json(serde_json::json!({"and": [["age", "in", []]]}))
            .unwrap()
            .unwrap();
        assert_eq!(compiled.sql, "1=0");
    }

    #[test]
    fn test_unsupported_operator() {
        let err = compile_json(serde_json::json!({"and": [["age", "~", 1]]})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperator { ref operator } if operator == "~"));
    }

    #[test]
    fn test_unknown_path() {
        let err = compile_json(serde_json::json!({"and": [["salary", "=", 1]]})).unwrap_err();
        assert!(matches!(err, Error::PathResolution { .. }));
    }

    #[test]
    fn test_empty_filters_yield_nothing() {
        assert!(compile_json(serde_json::json!({})).unwrap().is_none());
        assert!(compile_json(serde_json::json!({"and": []})).unwrap().is_none());
        assert!(compile_json(serde_json::json!({"and": [{"or": []}]}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_paths_in_order() {
        let filter: Filter = serde_json::from_value(serde_json::json!({
            "and": [["age", ">", 1], {"or": [["dept.name", "=", "x"]]}, ["name", "is", null]]
        }))
        .unwrap();
        assert_eq!(filter.paths(), vec!["age", "dept.name", "name"]);
    }
}
