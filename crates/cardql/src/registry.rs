//! Named database registry
//!
//! Built once at startup and shared by reference; cards name the database
//! they live in and the registry resolves that name, falling back to
//! `default` when a card names none.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{CardqlConfig, DEFAULT_DATABASE};
use crate::database::Database;
use crate::error::{Error, Result};

/// Name → database map
#[derive(Debug, Default)]
pub struct Registry {
    databases: HashMap<String, Arc<Database>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every configured database
    pub async fn from_config(config: &CardqlConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = Self::new();
        for (name, database) in &config.databases {
            let db = Database::connect(name.clone(), database).await?;
            info!(database = %name, kind = %database.database_type(), "database registered");
            registry.register(db);
        }
        Ok(registry)
    }

    /// Register a database under its own name, returning any entry it replaced
    pub fn register(&mut self, database: Database) -> Option<Arc<Database>> {
        self.databases
            .insert(database.name().to_string(), Arc::new(database))
    }

    /// Builder-style register
    pub fn with(mut self, database: Database) -> Self {
        self.register(database);
        self
    }

    /// Resolve a database by name; `None` or an empty name means `default`
    pub fn get(&self, name: Option<&str>) -> Result<Arc<Database>> {
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => DEFAULT_DATABASE,
        };
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unregistered(name))
    }

    /// Registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Close every database
    pub async fn close(&self) -> Result<()> {
        for db in self.databases.values() {
            db.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseType;
    use crate::dialect::dialect_for;
    use crate::pool::SimpleConnectionPool;
    use crate::testing::MockConnectionFactory;

    async fn mock(name: &str, database_type: DatabaseType) -> Database {
        let factory = Arc::new(MockConnectionFactory::new(database_type));
        let pool = SimpleConnectionPool::new(Default::default(), factory)
            .await
            .unwrap();
        Database::new(name, dialect_for(database_type), pool)
    }

    #[tokio::test]
    async fn test_get_defaults_to_default() {
        let registry = Registry::new()
            .with(mock("default", DatabaseType::MySQL).await)
            .with(mock("archive", DatabaseType::Oracle).await);

        assert_eq!(registry.get(None).unwrap().name(), "default");
        assert_eq!(registry.get(Some("")).unwrap().name(), "default");
        assert_eq!(
            registry.get(Some("archive")).unwrap().database_type(),
            DatabaseType::Oracle
        );
    }

    #[tokio::test]
    async fn test_unregistered_name() {
        let registry = Registry::new().with(mock("default", DatabaseType::MySQL).await);
        let err = registry.get(Some("missing")).unwrap_err();
        assert!(matches!(err, Error::UnregisteredBackend { ref name } if name == "missing"));
    }
}
