//! Card-level operations
//!
//! [`Cards`] is the entry point: it resolves a card's descriptor, picks the
//! card's database from the registry, compiles the statements and runs them.
//! Writes and deletes run in one transaction per call.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardql::prelude::*;
//!
//! let config = CardqlConfig::from_file("cardql.yaml")?;
//! let cards = Cards::from_config(&config).await?;
//!
//! let people = cards
//!     .read("人员", &["姓名", "部门.名称"], QueryOptions::default().with_page(20, 1))
//!     .await?;
//! let saved = cards
//!     .write("人员", &["姓名"], vec![Record::new().with("姓名", "张三")])
//!     .await?;
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{CardqlConfig, WriteConfig};
use crate::database::Database;
use crate::delete::{delete_records, DeleteScope};
use crate::error::Result;
use crate::metadata::{Card, MetadataStore, SqlCardSource};
use crate::query::{self, ReadOptions};
use crate::registry::Registry;
use crate::tree::{self, TreeOptions};
use crate::types::{Record, Value};
use crate::write::{write_records, WriteGroup};

/// Read, write, delete and tree operations over card descriptors
#[derive(Debug, Clone)]
pub struct Cards {
    registry: Arc<Registry>,
    metadata: Arc<MetadataStore>,
    write: WriteConfig,
}

impl Cards {
    /// Create over an existing registry and metadata store
    pub fn new(registry: Arc<Registry>, metadata: Arc<MetadataStore>) -> Self {
        Self {
            registry,
            metadata,
            write: WriteConfig::default(),
        }
    }

    /// Override the audit and marker columns used by writes and tree deletes
    pub fn with_write_config(mut self, write: WriteConfig) -> Self {
        self.write = write;
        self
    }

    /// Open every configured database and read descriptors from the
    /// configured metadata database
    pub async fn from_config(config: &CardqlConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(Registry::from_config(config).await?);
        let metadata_db = registry.get(Some(&config.metadata.database))?;
        let metadata = Arc::new(MetadataStore::new(Arc::new(SqlCardSource::new(metadata_db))));
        info!(
            databases = registry.names().count(),
            metadata = %config.metadata.database,
            "cardql ready"
        );
        Ok(Self::new(registry, metadata).with_write_config(config.write.clone()))
    }

    /// Database registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Descriptor store
    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    fn database_for(&self, card: &Card) -> Result<Arc<Database>> {
        self.registry.get(card.db_name.as_deref())
    }

    /// Read records of `card`.
    ///
    /// `options` is either an identifier (one record, unpaged) or a query.
    pub async fn read<S: AsRef<str>>(
        &self,
        card: &str,
        model: &[S],
        options: impl Into<ReadOptions>,
    ) -> Result<Vec<Record>> {
        let card = self.metadata.load(card).await?;
        let db = self.database_for(&card)?;
        let options: ReadOptions = options.into();
        let options = options.into_query();

        let compiled =
            query::compile(&self.metadata, card, model, &options, db.dialect()).await?;
        let rows = db.query(&compiled.sql, &compiled.params).await?;
        Ok(query::reshape(rows, &compiled.model))
    }

    /// Save records of one card; see [`Cards::write_many`]
    pub async fn write<S: AsRef<str>>(
        &self,
        card: &str,
        model: &[S],
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let mut saved = self
            .write_many(vec![WriteGroup::new(card, model, records)])
            .await?;
        Ok(saved.pop().unwrap_or_default())
    }

    /// Save several groups in one transaction on the first group's database.
    ///
    /// Returns one record list per group, in call order, with identifiers
    /// filled in. Any failure rolls back every group.
    pub async fn write_many(&self, groups: Vec<WriteGroup>) -> Result<Vec<Vec<Record>>> {
        let Some(first) = groups.first() else {
            return Ok(Vec::new());
        };

        let mut cards = Vec::with_capacity(groups.len());
        for group in &groups {
            cards.push(self.metadata.load(&group.card).await?);
        }
        let db = self.database_for(&cards[0])?;
        for card in &cards[1..] {
            if card.db_name != cards[0].db_name {
                warn!(
                    card = %card.name,
                    database = %db.name(),
                    "card lives in another database, writing through the first group's"
                );
            }
        }
        debug!(card = %first.card, groups = groups.len(), database = %db.name(), "write");

        let config = &self.write;
        db.trans(|tx| async move {
            let mut saved = Vec::with_capacity(groups.len());
            for (group, card) in groups.into_iter().zip(&cards) {
                saved.push(write_records(&tx, card, &group.model, group.records, config).await?);
            }
            Ok(saved)
        })
        .await
    }

    /// Delete rows by identifier, returning the ids that removed a row
    pub async fn delete(&self, card: &str, ids: &[Value]) -> Result<Vec<Value>> {
        self.delete_scoped(card, ids, DeleteScope::Row).await
    }

    /// Delete rows and their descendants by materialized path
    pub async fn delete_tree(&self, card: &str, ids: &[Value]) -> Result<Vec<Value>> {
        self.delete_scoped(card, ids, DeleteScope::Subtree).await
    }

    async fn delete_scoped(
        &self,
        card: &str,
        ids: &[Value],
        scope: DeleteScope,
    ) -> Result<Vec<Value>> {
        let card = self.metadata.load(card).await?;
        let db = self.database_for(&card)?;
        let config = &self.write;
        let card = card.as_ref();

        db.trans(|tx| async move { delete_records(&tx, card, ids, scope, config).await })
            .await
    }

    /// Read records and arrange them into a forest through `parent_path`
    pub async fn read_tree<S: AsRef<str>>(
        &self,
        card: &str,
        model: &[S],
        parent_path: &str,
        options: TreeOptions,
    ) -> Result<Vec<Record>> {
        let descriptor = self.metadata.load(card).await?;
        let mut model = query::normalize_model(&descriptor, model);
        if !model.iter().any(|p| p == parent_path) {
            warn!(card, parent = parent_path, "parent path missing from model, added");
            model.push(parent_path.to_string());
        }

        let records = self.read(card, &model, options.read).await?;
        Ok(tree::assemble(records, parent_path, options.root.as_ref()))
    }

    /// Close every database
    pub async fn close(&self) -> Result<()> {
        self.registry.close().await
    }
}
