//! Upsert of card records
//!
//! Records carrying an identifier are updated first and inserted when the
//! update matches no row; records without one get a fresh version-1 UUID and
//! are inserted. Audit columns are filled from [`WriteConfig`] on the server
//! clock.

use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::WriteConfig;
use crate::database::Executor;
use crate::error::Result;
use crate::metadata::{Card, ID_PATH};
use crate::types::{Record, Value};

/// Records to save under one card and model
#[derive(Debug, Clone, PartialEq)]
pub struct WriteGroup {
    /// Card name
    pub card: String,
    /// Paths to save; empty or `*` saves every member
    pub model: Vec<String>,
    /// Records in call order
    pub records: Vec<Record>,
}

impl WriteGroup {
    /// Create a group
    pub fn new<S: AsRef<str>>(card: impl Into<String>, model: &[S], records: Vec<Record>) -> Self {
        Self {
            card: card.into(),
            model: model.iter().map(|p| p.as_ref().to_string()).collect(),
            records,
        }
    }
}

fn node_id() -> &'static [u8; 6] {
    static NODE: OnceLock<[u8; 6]> = OnceLock::new();
    NODE.get_or_init(|| {
        let random = Uuid::new_v4();
        let mut node = [0u8; 6];
        node.copy_from_slice(&random.as_bytes()[..6]);
        // Random node ids carry the multicast bit
        node[0] |= 0x01;
        node
    })
}

/// New record identifier: a time-ordered UUID, uppercase, without hyphens
pub fn generate_id() -> String {
    Uuid::now_v1(node_id())
        .simple()
        .to_string()
        .to_uppercase()
}

/// Column/value pairs of one record
struct Assignments {
    columns: Vec<String>,
    values: Vec<Value>,
}

/// Writable `(path, column)` pairs of a model, in model order
fn writable_columns<'c, S: AsRef<str>>(
    card: &'c Card,
    model: &[S],
    config: &WriteConfig,
) -> Vec<(String, &'c str)> {
    let wildcard = model.is_empty() || (model.len() == 1 && model[0].as_ref() == "*");
    let paths: Vec<String> = if wildcard {
        card.member_names().map(String::from).collect()
    } else {
        model.iter().map(|p| p.as_ref().to_string()).collect()
    };

    paths
        .into_iter()
        .filter(|path| !config.is_skipped(path))
        .filter_map(|path| {
            let column = card.member_column(&path)?;
            Some((path, column))
        })
        .collect()
}

/// Statement builder for one card
struct Upsert<'a> {
    card: &'a Card,
    config: &'a WriteConfig,
    actor: String,
    department: String,
}

impl<'a> Upsert<'a> {
    fn new(card: &'a Card, config: &'a WriteConfig, executor: &Executor) -> Self {
        let dialect = executor.dialect();
        Self {
            card,
            config,
            actor: format!("'{}'", dialect.escape_string(&config.actor)),
            department: format!("'{}'", dialect.escape_string(&config.department)),
        }
    }

    fn update_sql(&self, columns: &[String]) -> String {
        let c = self.config;
        let sets: Vec<String> = columns
            .iter()
            .map(|col| format!("{}=?", col))
            .chain([
                format!("{}=SYSDATE()", c.updated_at_column),
                format!("{}={}", c.updated_by_column, self.actor),
                format!("{}={}", c.updated_dept_column, self.department),
            ])
            .collect();
        format!(
            "UPDATE {} SET {} WHERE ID=?",
            self.card.table_name,
            sets.join(",")
        )
    }

    fn insert_sql(&self, columns: &[String]) -> String {
        let c = self.config;
        let slots = vec!["?"; columns.len()].join(",");
        format!(
            "INSERT INTO {} ({},{},{},{},{},{},{}) VALUES ({},SYSDATE(),{},{},SYSDATE(),{},{})",
            self.card.table_name,
            columns.join(","),
            c.created_at_column,
            c.created_by_column,
            c.created_dept_column,
            c.updated_at_column,
            c.updated_by_column,
            c.updated_dept_column,
            slots,
            self.actor,
            self.department,
            self.actor,
            self.department,
        )
    }

    async fn insert(&self, executor: &Executor, id: &Value, row: &Assignments) -> Result<()> {
        let mut columns = Vec::with_capacity(row.columns.len() + 2);
        let mut values = Vec::with_capacity(row.values.len() + 2);
        columns.push(ID_PATH.to_string());
        values.push(id.clone());
        columns.extend(row.columns.iter().cloned());
        values.extend(row.values.iter().cloned());

        let deleted = &self.config.deleted_column;
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(deleted)) {
            columns.push(deleted.clone());
            values.push(Value::from(self.config.not_deleted_value.as_str()));
        }

        executor.execute(&self.insert_sql(&columns), &values).await?;
        Ok(())
    }

    async fn save(
        &self,
        executor: &Executor,
        record: &mut Record,
        paths: &[(String, &str)],
    ) -> Result<()> {
        let row = Assignments {
            columns: paths.iter().map(|(_, col)| col.to_string()).collect(),
            values: paths
                .iter()
                .map(|(path, _)| record.get(path).cloned().unwrap_or_default())
                .collect(),
        };

        if record.has_id() {
            let id = record.id().cloned().unwrap_or_default();
            let mut params = row.values.clone();
            params.push(id.clone());

            let outcome = executor
                .execute(&self.update_sql(&row.columns), &params)
                .await?;
            if outcome.affected == 0 {
                debug!(card = %self.card.name, id = %id, "update matched no row, inserting");
                self.insert(executor, &id, &row).await?;
            }
        } else {
            let id = Value::from(generate_id());
            self.insert(executor, &id, &row).await?;
            record.set(ID_PATH, id);
        }
        Ok(())
    }
}

/// Save `records` of one card inside the caller's transaction.
///
/// Returns the records with identifiers filled in, in input order. Model
/// paths that are not members of the card, and audit paths, are ignored;
/// members missing from a record are written as NULL.
pub async fn write_records<S: AsRef<str>>(
    executor: &Executor,
    card: &Card,
    model: &[S],
    mut records: Vec<Record>,
    config: &WriteConfig,
) -> Result<Vec<Record>> {
    let paths = writable_columns(card, model, config);
    let upsert = Upsert::new(card, config, executor);

    for record in &mut records {
        upsert.save(executor, record, &paths).await?;
    }

    debug!(card = %card.name, records = records.len(), "records saved");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card::new("人员", "RY")
            .with_field("姓名", "XM", "Text")
            .with_field("记录时间", "RCDAT", "Date")
            .with_reference("部门", "BM_ID", "部门")
    }

    #[test]
    fn test_generated_ids() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_writable_columns_skip_audit_and_unknown_paths() {
        let card = card();
        let config = WriteConfig::default();

        let all = writable_columns(&card, &["*"], &config);
        assert_eq!(
            all,
            vec![("姓名".to_string(), "XM"), ("部门".to_string(), "BM_ID")]
        );

        let picked = writable_columns(&card, &["ID", "部门", "工资", "记录时间"], &config);
        assert_eq!(picked, vec![("部门".to_string(), "BM_ID")]);
    }
}
