//! Tests for cardql configuration loading

use cardql::prelude::*;
use std::io::Write;
use std::time::Duration;

const CONFIG: &str = r#"
databases:
  default:
    kind: mysql
    url: mysql://app:${CARDQL_TEST_MYSQL_PASSWORD:-changeme}@db:3306/cards
    pool:
      min_size: 0
      max_size: 5
      acquire_timeout_ms: 2500
  archive:
    kind: oracle
    user: archive
    password: ${CARDQL_TEST_ORACLE_PASSWORD}
    connect_string: ora:1521/ORCLPDB1
metadata:
  database: archive
write:
  actor: system
  path_column: TREE_PATH
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_from_file() {
    let file = write_config(CONFIG);
    let config = CardqlConfig::from_file(file.path()).unwrap();

    assert_eq!(config.databases.len(), 2);
    let default = &config.databases["default"];
    assert_eq!(default.database_type(), DatabaseType::MySQL);
    assert_eq!(default.pool().min_size, 0);
    assert_eq!(default.pool().max_size, 5);
    assert_eq!(default.pool().acquire_timeout, Duration::from_millis(2500));
    assert_eq!(default.pool().idle_timeout, PoolConfig::default().idle_timeout);

    assert_eq!(config.metadata.database, "archive");
    assert_eq!(config.write.actor, "system");
    assert_eq!(config.write.path_column, "TREE_PATH");
    assert_eq!(config.write.deleted_column, "ISDEL");
}

#[test]
fn test_env_defaults_fill_in() {
    let config = CardqlConfig::from_yaml(CONFIG).unwrap();
    match &config.databases["default"] {
        DatabaseConfig::Mysql(mysql) => {
            assert_eq!(mysql.url, "mysql://app:changeme@db:3306/cards");
        }
        other => panic!("expected mysql, got {:?}", other),
    }
}

#[test]
fn test_unset_secret_without_default_is_empty() {
    let config = CardqlConfig::from_yaml(CONFIG).unwrap();
    match &config.databases["archive"] {
        DatabaseConfig::Oracle(oracle) => {
            assert_eq!(oracle.user, "archive");
            assert_eq!(oracle.password, "");
        }
        other => panic!("expected oracle, got {:?}", other),
    }
}

#[test]
fn test_missing_file() {
    let err = CardqlConfig::from_file("/nonexistent/cardql.yaml").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn test_metadata_database_must_exist() {
    let yaml = r#"
databases:
  default:
    kind: mysql
    url: mysql://localhost/cards
metadata:
  database: meta
"#;
    let err = CardqlConfig::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("meta"));
}

#[test]
fn test_pool_bounds_validated() {
    let yaml = r#"
databases:
  default:
    kind: mysql
    url: mysql://localhost/cards
    pool:
      min_size: 8
      max_size: 2
"#;
    assert!(CardqlConfig::from_yaml(yaml).is_err());
}

#[test]
fn test_oracle_needs_connect_string() {
    let yaml = r#"
databases:
  default:
    kind: oracle
    user: app
    connect_string: ""
"#;
    assert!(CardqlConfig::from_yaml(yaml).is_err());
}

#[cfg(not(feature = "oracle"))]
#[test]
fn test_missing_backend_feature_reported() {
    let config = CardqlConfig::from_yaml(CONFIG).unwrap();
    let Err(err) = config.databases["archive"].connection_factory() else {
        panic!("oracle factory built without the oracle feature");
    };
    assert!(err.to_string().contains("oracle"));
}
