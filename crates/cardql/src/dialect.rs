//! SQL dialect abstraction for cardql
//!
//! The compilers emit one canonical SQL form: positional `?` placeholders and
//! `SYSDATE()` for the server clock. Each dialect renders that form into its
//! backend's native syntax right before execution, and supplies the
//! backend-specific clauses the compilers cannot spell generically:
//!
//! - Placeholders (`?` vs `:1, :2, ...`)
//! - Pagination (`LIMIT offset,rows` vs `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`)
//! - Current timestamp expression
//! - Bound substring pattern for `LIKE`
//! - Transaction start (explicit `BEGIN` vs implicit with autocommit off)

use std::fmt;
use std::sync::Arc;

use crate::connection::DatabaseType;
use crate::security::escape_string_literal;

/// Canonical placeholder emitted by the compilers
pub const CANONICAL_PLACEHOLDER: char = '?';

/// Canonical server-clock expression emitted by the compilers
pub const CANONICAL_NOW: &str = "SYSDATE()";

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Backend this dialect renders for
    fn database_type(&self) -> DatabaseType;

    /// Get the placeholder for the parameter at 1-based `index`
    fn placeholder(&self, index: usize) -> String;

    /// Get current timestamp expression
    fn current_timestamp(&self) -> &'static str;

    /// Get the LIMIT/OFFSET syntax (leading space included)
    fn limit_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String;

    /// Expression matching any string containing one bound parameter
    fn contains_pattern(&self) -> &'static str;

    /// Statement that opens a transaction, or `None` when the backend starts
    /// one implicitly as soon as autocommit is off
    fn begin_statement(&self) -> Option<&'static str>;

    /// Escape a string literal
    fn escape_string(&self, value: &str) -> String {
        escape_string_literal(value)
    }

    /// Render canonical SQL into native syntax.
    ///
    /// Placeholders are numbered left to right. Text inside single-quoted
    /// literals is copied untouched, so a `?` in an interpolated `LIKE`
    /// pattern never becomes a bind slot.
    fn render(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 16);
        let mut in_literal = false;
        let mut index = 0;
        let mut rest = sql;

        while let Some(c) = rest.chars().next() {
            if c == '\'' {
                in_literal = !in_literal;
            } else if !in_literal {
                if c == CANONICAL_PLACEHOLDER {
                    index += 1;
                    out.push_str(&self.placeholder(index));
                    rest = &rest[1..];
                    continue;
                }
                if starts_with_ignore_case(rest, CANONICAL_NOW) {
                    out.push_str(self.current_timestamp());
                    rest = &rest[CANONICAL_NOW.len()..];
                    continue;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        out
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Translate `rows`/`page` into `(limit, offset)`.
///
/// `rows <= 0` disables pagination; pages below 1 are treated as page 1.
pub fn page_window(rows: i64, page: i64) -> Option<(u64, u64)> {
    if rows <= 0 {
        return None;
    }
    let rows = rows as u64;
    let page = page.max(1) as u64;
    Some((rows, (page - 1).saturating_mul(rows)))
}

// ===========================================================================
// MySQL
// ===========================================================================

/// MySQL dialect
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn current_timestamp(&self) -> &'static str {
        "SYSDATE()"
    }

    fn limit_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {},{}", o, l),
            (Some(l), None) => format!(" LIMIT {}", l),
            // MySQL has no OFFSET without LIMIT; use the documented maximum
            (None, Some(o)) => format!(" LIMIT {},18446744073709551615", o),
            (None, None) => String::new(),
        }
    }

    fn contains_pattern(&self) -> &'static str {
        "CONCAT('%',?,'%')"
    }

    fn begin_statement(&self) -> Option<&'static str> {
        Some("BEGIN")
    }

    fn escape_string(&self, value: &str) -> String {
        escape_string_literal(value).replace('\\', "\\\\")
    }
}

// ===========================================================================
// Oracle
// ===========================================================================

/// Oracle dialect
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Oracle
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn current_timestamp(&self) -> &'static str {
        "SYSDATE"
    }

    fn limit_offset_sql(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", o, l),
            (Some(l), None) => format!(" OFFSET 0 ROWS FETCH NEXT {} ROWS ONLY", l),
            (None, Some(o)) => format!(" OFFSET {} ROWS", o),
            (None, None) => String::new(),
        }
    }

    fn contains_pattern(&self) -> &'static str {
        "'%'||?||'%'"
    }

    fn begin_statement(&self) -> Option<&'static str> {
        None
    }
}

/// Get a dialect for a database type
pub fn dialect_for(database_type: DatabaseType) -> Arc<dyn SqlDialect> {
    match database_type {
        DatabaseType::MySQL => Arc::new(MySqlDialect),
        DatabaseType::Oracle => Arc::new(OracleDialect),
    }
}
