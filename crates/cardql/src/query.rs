//! Model path resolution and SELECT compilation
//!
//! A model is a list of dotted paths walked from the root card. Every
//! reference crossed in the middle of a path becomes a `LEFT JOIN`; joins are
//! shared by every path that crosses the same reference column. Selected
//! columns are aliased positionally (`C0`, `C1`, ...) and mapped back to the
//! caller's path names by [`reshape`].

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dialect::{page_window, SqlDialect};
use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::metadata::{Card, MetadataStore, ID_PATH, ID_TYPE};
use crate::types::{Record, RowSet, Value};

/// Page size applied when a query does not set one
pub const DEFAULT_ROWS: i64 = 100;

/// Alias of the root table
const ROOT_ALIAS: &str = "T0";

/// Resolved column of a model path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Alias-qualified column, e.g. `T1.MC`
    pub column: String,
    /// Declared type tag
    pub column_type: String,
}

impl ColumnRef {
    /// Create a column reference
    pub fn new(column: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            column_type: column_type.into(),
        }
    }
}

/// Path → column mapping of one compiled query
#[derive(Debug, Clone)]
pub struct ColumnMap {
    card: String,
    columns: HashMap<String, ColumnRef>,
}

impl ColumnMap {
    /// Empty mapping for queries rooted at `card`
    pub fn new(card: impl Into<String>) -> Self {
        Self {
            card: card.into(),
            columns: HashMap::new(),
        }
    }

    /// Map a path to a column
    pub fn insert(&mut self, path: impl Into<String>, column: ColumnRef) {
        self.columns.insert(path.into(), column);
    }

    /// Whether a path is mapped
    pub fn contains(&self, path: &str) -> bool {
        self.columns.contains_key(path)
    }

    /// Column of a path; unmapped paths are resolution errors
    pub fn get(&self, path: &str) -> Result<&ColumnRef> {
        self.columns
            .get(path)
            .ok_or_else(|| Error::path(path, &self.card, path))
    }

    /// Number of mapped paths
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One table in the FROM clause
#[derive(Debug, Clone)]
pub struct Join {
    /// Table alias (`T0`, `T1`, ...)
    pub alias: String,
    /// Card joined in
    pub card: Arc<Card>,
    /// Alias-qualified reference column the join hangs off; `None` for the root
    pub reference: Option<String>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl Direction {
    /// `desc` in any case is descending, anything else ascending
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordered `path → direction` list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Order(Vec<(String, Direction)>);

impl Order {
    /// Empty ordering
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key
    pub fn then(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.0.push((path.into(), direction));
        self
    }

    /// Whether no sort key is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sort keys in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.0.iter().map(|(p, d)| (p.as_str(), *d))
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderVisitor;

        impl<'de> Visitor<'de> for OrderVisitor {
            type Value = Order;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping paths to 'asc' or 'desc'")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Order, E> {
                Ok(Order::new())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Order, A::Error> {
                let mut order = Order::new();
                while let Some((path, direction)) = access.next_entry::<String, String>()? {
                    order.0.push((path, Direction::parse(&direction)));
                }
                Ok(order)
            }
        }

        deserializer.deserialize_any(OrderVisitor)
    }
}

/// Filter, order and page of a read
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Filter tree
    pub filter: Option<Filter>,
    /// Sort keys
    pub order: Order,
    /// Page size; `<= 0` disables pagination
    #[serde(deserialize_with = "rows_or_default")]
    pub rows: i64,
    /// 1-based page number
    #[serde(deserialize_with = "page_or_default")]
    pub page: i64,
}

fn rows_or_default<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(DEFAULT_ROWS))
}

fn page_or_default<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?
        .filter(|page| *page != 0)
        .unwrap_or(1))
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            filter: None,
            order: Order::new(),
            rows: DEFAULT_ROWS,
            page: 1,
        }
    }
}

impl QueryOptions {
    /// Select the single row with the given identifier, unpaged and unordered
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self {
            filter: Some(Filter::by_id(id)),
            order: Order::new(),
            rows: 0,
            page: 1,
        }
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the sort keys
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Set page size and number
    pub fn with_page(mut self, rows: i64, page: i64) -> Self {
        self.rows = rows;
        self.page = page;
        self
    }
}

/// Read options as accepted on the wire: a bare identifier or a query object
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOptions {
    /// Shorthand for an identifier match
    Id(Value),
    /// Full query
    Query(QueryOptions),
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::Query(QueryOptions::default())
    }
}

impl ReadOptions {
    /// Expand the identifier shorthand
    pub fn into_query(self) -> QueryOptions {
        match self {
            Self::Id(id) => QueryOptions::by_id(id),
            Self::Query(query) => query,
        }
    }
}

impl From<QueryOptions> for ReadOptions {
    fn from(query: QueryOptions) -> Self {
        Self::Query(query)
    }
}

impl From<&str> for ReadOptions {
    fn from(id: &str) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<String> for ReadOptions {
    fn from(id: String) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<i64> for ReadOptions {
    fn from(id: i64) -> Self {
        Self::Id(Value::from(id))
    }
}

impl<'de> Deserialize<'de> for ReadOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(_) => QueryOptions::deserialize(raw)
                .map(Self::Query)
                .map_err(de::Error::custom),
            serde_json::Value::Array(_) => Err(de::Error::custom(
                "read options must be an identifier or a query object",
            )),
            scalar => Ok(Self::Id(Value::from(scalar))),
        }
    }
}

/// A compiled SELECT in canonical SQL
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Canonical SQL
    pub sql: String,
    /// Parameters in placeholder order
    pub params: Vec<Value>,
    /// Normalized model; index `i` is selected as `C{i}`
    pub model: Vec<String>,
    /// Tables in join-creation order, root first
    pub joins: Vec<Join>,
}

/// Apply the model defaults: empty or `*` selects the identifier plus every
/// member, and the identifier is always selected first when missing.
pub fn normalize_model<S: AsRef<str>>(card: &Card, model: &[S]) -> Vec<String> {
    let wildcard = model.is_empty() || (model.len() == 1 && model[0].as_ref() == "*");
    let mut paths: Vec<String> = if wildcard {
        std::iter::once(ID_PATH)
            .chain(card.member_names())
            .map(String::from)
            .collect()
    } else {
        model.iter().map(|p| p.as_ref().to_string()).collect()
    };

    if !paths.iter().any(|p| p == ID_PATH) {
        paths.insert(0, ID_PATH.to_string());
    }
    paths
}

/// Walks paths through the schema graph, growing the join list
struct PathResolver<'a> {
    metadata: &'a MetadataStore,
    joins: Vec<Join>,
}

impl<'a> PathResolver<'a> {
    fn new(metadata: &'a MetadataStore, card: Arc<Card>) -> Self {
        Self {
            metadata,
            joins: vec![Join {
                alias: ROOT_ALIAS.to_string(),
                card,
                reference: None,
            }],
        }
    }

    fn root(&self) -> &Card {
        &self.joins[0].card
    }

    async fn resolve(&mut self, path: &str) -> Result<ColumnRef> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut cursor = 0;

        for (i, segment) in segments.iter().copied().enumerate() {
            let last = i + 1 == segments.len();
            let join = &self.joins[cursor];

            if segment == ID_PATH {
                if !last {
                    return Err(Error::path(path, &join.card.name, segment));
                }
                return Ok(ColumnRef::new(format!("{}.ID", join.alias), ID_TYPE));
            }

            if let Some(field) = join.card.field(segment) {
                if !last {
                    return Err(Error::path(path, &join.card.name, segment));
                }
                return Ok(ColumnRef::new(
                    format!("{}.{}", join.alias, field.column_name),
                    field.field_type.clone(),
                ));
            }

            let Some(reference) = join.card.reference(segment) else {
                return Err(Error::path(path, &join.card.name, segment));
            };
            let via = format!("{}.{}", join.alias, reference.column_name);

            if last {
                return Ok(ColumnRef::new(via, reference.reference_type.clone()));
            }

            cursor = match self
                .joins
                .iter()
                .position(|j| j.reference.as_deref() == Some(via.as_str()))
            {
                Some(existing) => existing,
                None => {
                    let target = reference.target_name.clone();
                    let card = self.metadata.load(&target).await?;
                    self.joins.push(Join {
                        alias: format!("T{}", self.joins.len()),
                        card,
                        reference: Some(via),
                    });
                    self.joins.len() - 1
                }
            };
        }

        Err(Error::path(path, &self.root().name, path))
    }

    fn from_clause(&self) -> String {
        let mut sql = String::new();
        for join in &self.joins {
            match &join.reference {
                None => {
                    sql.push_str(&join.card.table_name);
                    sql.push(' ');
                    sql.push_str(&join.alias);
                }
                Some(via) => sql.push_str(&format!(
                    " LEFT JOIN {} {} ON {}={}.ID",
                    join.card.table_name, join.alias, via, join.alias
                )),
            }
        }
        sql
    }
}

/// Compile a read of `model` on `card`.
///
/// Filter and order paths outside the model are resolved the same way and may
/// add joins, but are not selected.
pub async fn compile<S: AsRef<str>>(
    metadata: &MetadataStore,
    card: Arc<Card>,
    model: &[S],
    options: &QueryOptions,
    dialect: &dyn SqlDialect,
) -> Result<CompiledQuery> {
    let model = normalize_model(&card, model);
    let mut columns = ColumnMap::new(&card.name);
    let mut resolver = PathResolver::new(metadata, card);
    let mut select = Vec::with_capacity(model.len());

    for (i, path) in model.iter().enumerate() {
        let column = resolver.resolve(path).await?;
        select.push(format!("{} C{}", column.column, i));
        columns.insert(path.clone(), column);
    }

    let filter_paths = options.filter.iter().flat_map(|f| f.paths());
    let order_paths = options.order.iter().map(|(p, _)| p);
    for path in filter_paths.chain(order_paths) {
        if !columns.contains(path) {
            let column = resolver.resolve(path).await?;
            columns.insert(path, column);
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        select.join(","),
        resolver.from_clause()
    );
    let mut params = Vec::new();

    if let Some(compiled) = match &options.filter {
        Some(f) => filter::compile(f, &columns, dialect)?,
        None => None,
    } {
        sql.push_str(" WHERE ");
        sql.push_str(&compiled.sql);
        params = compiled.params;
    }

    if !options.order.is_empty() {
        let keys = options
            .order
            .iter()
            .map(|(path, direction)| {
                columns
                    .get(path)
                    .map(|c| format!("{} {}", c.column, direction.keyword()))
            })
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(","));
    }

    if let Some((limit, offset)) = page_window(options.rows, options.page) {
        sql.push_str(&dialect.limit_offset_sql(Some(limit), Some(offset)));
    }

    Ok(CompiledQuery {
        sql,
        params,
        model,
        joins: resolver.joins,
    })
}

/// Map positional `C{i}` columns back to model paths
pub fn reshape(rows: RowSet, model: &[String]) -> Vec<Record> {
    rows.rows
        .into_iter()
        .map(|row| {
            let mut record = Record::new();
            for (i, path) in model.iter().enumerate() {
                let value = row
                    .get_by_name(&format!("C{}", i))
                    .or_else(|| row.get(i))
                    .cloned()
                    .unwrap_or_default();
                record.set(path.clone(), value);
            }
            record
        })
        .collect()
}
