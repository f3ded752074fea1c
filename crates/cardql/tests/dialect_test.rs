//! Tests for cardql dialect rendering

use cardql::dialect::{dialect_for, page_window, MySqlDialect, OracleDialect, SqlDialect};
use cardql::prelude::DatabaseType;

#[test]
fn test_mysql_render_is_identity() {
    let sql = "UPDATE RY SET XM=?,RUDAT=SYSDATE(),RUOPR_ID='-' WHERE ID=?";
    assert_eq!(MySqlDialect.render(sql), sql);
}

#[test]
fn test_oracle_numbers_placeholders() {
    let rendered =
        OracleDialect.render("UPDATE RY SET XM=?,RUDAT=SYSDATE(),RUOPR_ID='-' WHERE ID=?");
    assert_eq!(
        rendered,
        "UPDATE RY SET XM=:1,RUDAT=SYSDATE,RUOPR_ID='-' WHERE ID=:2"
    );
}

#[test]
fn test_render_skips_literals() {
    let rendered = OracleDialect.render("SELECT * FROM T WHERE A LIKE '%why?%' AND B=?");
    assert_eq!(rendered, "SELECT * FROM T WHERE A LIKE '%why?%' AND B=:1");

    let rendered = OracleDialect.render("SELECT 'SYSDATE()' FROM DUAL WHERE D<sysdate()");
    assert_eq!(rendered, "SELECT 'SYSDATE()' FROM DUAL WHERE D<SYSDATE");
}

#[test]
fn test_render_handles_escaped_quotes() {
    let rendered = OracleDialect.render("SELECT * FROM T WHERE A LIKE '%O''Brien?%' AND B=?");
    assert_eq!(rendered, "SELECT * FROM T WHERE A LIKE '%O''Brien?%' AND B=:1");
}

#[test]
fn test_render_non_ascii() {
    let rendered = OracleDialect.render("SELECT T0.MC C0 FROM 部门 T0 WHERE T0.MC=?");
    assert_eq!(rendered, "SELECT T0.MC C0 FROM 部门 T0 WHERE T0.MC=:1");
}

#[test]
fn test_page_window() {
    assert_eq!(page_window(10, 3), Some((10, 20)));
    assert_eq!(page_window(100, 1), Some((100, 0)));
    assert_eq!(page_window(10, 0), Some((10, 0)));
    assert_eq!(page_window(10, -4), Some((10, 0)));
    assert_eq!(page_window(0, 3), None);
    assert_eq!(page_window(-1, 1), None);
}

#[test]
fn test_pagination_is_numerically_identical() {
    let (limit, offset) = page_window(10, 3).unwrap();
    assert_eq!(
        MySqlDialect.limit_offset_sql(Some(limit), Some(offset)),
        " LIMIT 20,10"
    );
    assert_eq!(
        OracleDialect.limit_offset_sql(Some(limit), Some(offset)),
        " OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

#[test]
fn test_contains_patterns() {
    assert_eq!(MySqlDialect.contains_pattern(), "CONCAT('%',?,'%')");
    assert_eq!(
        OracleDialect.render(&format!("X LIKE {}", OracleDialect.contains_pattern())),
        "X LIKE '%'||:1||'%'"
    );
}

#[test]
fn test_escape_string() {
    assert_eq!(MySqlDialect.escape_string(r"a\'b"), r"a\\''b");
    assert_eq!(OracleDialect.escape_string(r"a\'b"), r"a\''b");
}

#[test]
fn test_transaction_start() {
    assert_eq!(dialect_for(DatabaseType::MySQL).begin_statement(), Some("BEGIN"));
    assert_eq!(dialect_for(DatabaseType::Oracle).begin_statement(), None);
}
