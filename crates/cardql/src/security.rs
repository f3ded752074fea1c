//! SQL injection guards for cardql.
//!
//! Card descriptors supply table and column names that are spliced into
//! statements verbatim, and the `like` operator interpolates its operand into
//! a quoted literal. Everything else travels as a bound parameter.
//!
//! Provides:
//! - Identifier validation for table and column names read from descriptors
//! - String literal escaping for SQL string contexts

use crate::error::Error;

/// Validate a SQL identifier (table or column name).
///
/// Enforces:
/// - Must not be empty
/// - Maximum 128 characters
/// - Must start with a letter or underscore
/// - May only contain letters, digits, underscores, `$` and `#`
///
/// Letters are Unicode letters, so CJK column names pass.
///
/// # Examples
///
/// ```
/// use cardql::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("A_KPDY").is_ok());
/// assert!(validate_sql_identifier("KH_ID").is_ok());
/// assert!(validate_sql_identifier("名称").is_ok());
///
/// assert!(validate_sql_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("1ABC").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    let length = name.chars().count();
    if length > 128 {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max 128)",
            length
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !(c.is_alphanumeric() || c == '_' || c == '$' || c == '#') {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

/// Escape a string value for interpolation into a single-quoted SQL literal.
///
/// Replaces `'` with `''`. Dialects layer backend quirks on top (MySQL also
/// treats backslash as an escape character).
///
/// # Examples
///
/// ```
/// use cardql::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("north"), "north");
/// assert_eq!(escape_string_literal("O'Brien"), "O''Brien");
/// assert_eq!(escape_string_literal("x'; DROP TABLE t--"), "x''; DROP TABLE t--");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_sql_identifier("ID").is_ok());
        assert!(validate_sql_identifier("_hidden").is_ok());
        assert!(validate_sql_identifier("RCOPR_ID").is_ok());
        assert!(validate_sql_identifier("SYS$LOG").is_ok());
        assert!(validate_sql_identifier("客户").is_ok());
    }

    #[test]
    fn test_identifier_injection_attempts() {
        assert!(validate_sql_identifier("ID=1 OR 1").is_err());
        assert!(validate_sql_identifier("T0.ID").is_err());
        assert!(validate_sql_identifier("A--").is_err());
        assert!(validate_sql_identifier("A'B").is_err());
        assert!(validate_sql_identifier("A B").is_err());
    }

    #[test]
    fn test_identifier_length_limit() {
        let ok = "A".repeat(128);
        let too_long = "A".repeat(129);
        assert!(validate_sql_identifier(&ok).is_ok());
        assert!(validate_sql_identifier(&too_long).is_err());
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal(""), "");
        assert_eq!(escape_string_literal("''"), "''''");
        assert_eq!(escape_string_literal("a'b'c"), "a''b''c");
    }
}
