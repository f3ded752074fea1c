//! # cardql
//!
//! Metadata-driven query compiler over card schema definitions.
//!
//! A card describes one table: its fields and its references to other
//! cards. Callers address data with dotted paths through that graph
//! (`负责人.部门.名称`) and declarative filter/order/page options; cardql
//! resolves the paths into joins, compiles the filter tree into a
//! parameterized predicate and runs the statement on the card's database.
//!
//! ## Features
//!
//! - **Path resolution**: model paths become `LEFT JOIN`s, shared between
//!   paths that cross the same reference
//! - **Filter trees**: nested `and`/`or` groups of `[path, operator, value]`
//!   triples
//! - **Upserts**: update-or-insert per record with generated identifiers and
//!   audit columns, one transaction per call
//! - **Best-effort deletes**: plain or by materialized ancestry path
//! - **Tree reads**: flat rows arranged into a forest through a parent path
//! - **Multiple backends**: MySQL and Oracle behind one dialect abstraction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cardql::prelude::*;
//!
//! let config = CardqlConfig::from_file("cardql.yaml")?;
//! let cards = Cards::from_config(&config).await?;
//!
//! let filter: Filter = serde_json::from_str(r#"{"and": [["年龄", ">", 18]]}"#)?;
//! let adults = cards
//!     .read("人员", &["姓名", "部门.名称"], QueryOptions::default().with_filter(filter))
//!     .await?;
//!
//! let one = cards.read("人员", &["*"], "8E1C0A7E...").await?;
//! let removed = cards.delete("人员", &["8E1C0A7E...".into()]).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` - MySQL/MariaDB support via mysql_async (default)
//! - `oracle` - Oracle support via the oracle crate (needs ODPI-C at runtime)
//! - `full` - All backends

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cards;
pub mod config;
pub mod connection;
pub mod database;
pub mod delete;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod pool;
pub mod query;
pub mod registry;
pub mod security;
pub mod testing;
pub mod tree;
pub mod types;
pub mod write;

// Backend implementations (conditionally compiled)
#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "oracle")]
pub mod oracle;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and record types
    pub use crate::types::{ExecOutcome, Record, Row, RowSet, Value};

    // Configuration
    pub use crate::config::{CardqlConfig, DatabaseConfig, MetadataConfig, WriteConfig};

    // Connections and pooling
    pub use crate::connection::{Connection, ConnectionFactory, DatabaseType, Transaction};
    pub use crate::pool::{
        ConnectionPool, PoolConfig, PoolStats, PooledConnection, SimpleConnectionPool,
    };

    // Dialects and databases
    pub use crate::database::{Database, Executor};
    pub use crate::dialect::{dialect_for, MySqlDialect, OracleDialect, SqlDialect};
    pub use crate::registry::Registry;

    // Card metadata
    pub use crate::metadata::{
        Card, CardSource, Field, MetadataStore, Reference, SqlCardSource, StaticCardSource,
    };

    // Operations
    pub use crate::cards::Cards;
    pub use crate::filter::{Condition, Filter, Logic, Triple};
    pub use crate::query::{Direction, Order, QueryOptions, ReadOptions};
    pub use crate::tree::TreeOptions;
    pub use crate::write::WriteGroup;
}

// Re-export commonly used items at crate root
pub use cards::Cards;
pub use error::{Error, Result};
pub use types::{Record, Value};
