//! Best-effort deletes
//!
//! Each identifier gets its own statement inside the caller's transaction.
//! A failing or non-matching statement leaves its id out of the result and
//! does not abort the others.

use tracing::{debug, warn};

use crate::config::WriteConfig;
use crate::database::Executor;
use crate::error::Result;
use crate::metadata::Card;
use crate::types::Value;

/// Which rows one identifier removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// The row itself
    Row,
    /// The row and every row whose materialized path contains its id
    Subtree,
}

fn delete_sql(
    card: &Card,
    scope: DeleteScope,
    executor: &Executor,
    config: &WriteConfig,
) -> String {
    match scope {
        DeleteScope::Row => format!("DELETE FROM {} WHERE ID=?", card.table_name),
        DeleteScope::Subtree => format!(
            "DELETE FROM {} WHERE ID=? OR {} LIKE {}",
            card.table_name,
            config.path_column,
            executor.dialect().contains_pattern()
        ),
    }
}

/// Delete `ids` of one card, returning the ids that removed at least one row
pub async fn delete_records(
    executor: &Executor,
    card: &Card,
    ids: &[Value],
    scope: DeleteScope,
    config: &WriteConfig,
) -> Result<Vec<Value>> {
    let sql = delete_sql(card, scope, executor, config);
    let mut deleted = Vec::with_capacity(ids.len());

    for id in ids {
        let params = match scope {
            DeleteScope::Row => vec![id.clone()],
            DeleteScope::Subtree => vec![id.clone(), id.clone()],
        };

        match executor.execute(&sql, &params).await {
            Ok(outcome) if outcome.affected > 0 => deleted.push(id.clone()),
            Ok(_) => debug!(card = %card.name, id = %id, "delete matched no row"),
            Err(e) => warn!(card = %card.name, id = %id, error = %e, "delete failed, skipped"),
        }
    }

    debug!(
        card = %card.name,
        requested = ids.len(),
        deleted = deleted.len(),
        "delete finished"
    );
    Ok(deleted)
}
