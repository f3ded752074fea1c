//! Card descriptors and the metadata store
//!
//! A card describes one table: its fields (plain columns) and references
//! (foreign-key-like links to other cards). Descriptors come from a
//! [`CardSource`] and are cached by [`MetadataStore`] for the life of the
//! process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::security::validate_sql_identifier;
use crate::types::{Row, Value};

/// Pseudo-field naming the row identifier on every card
pub const ID_PATH: &str = "ID";

/// Type tag of identifiers and reference columns
pub const ID_TYPE: &str = "Text";

/// Suffix appended to a reference's code to form its column
pub const REFERENCE_COLUMN_SUFFIX: &str = "_ID";

/// Plain column of a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Descriptor row id
    #[serde(default)]
    pub id: Option<String>,
    /// Path segment name
    pub name: String,
    /// Physical column
    pub column_name: String,
    /// Declared type tag
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Link from a card to another card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Descriptor row id
    #[serde(default)]
    pub id: Option<String>,
    /// Path segment name
    pub name: String,
    /// Local column holding the target identifier
    pub column_name: String,
    /// Name of the target card
    pub target_name: String,
    /// Type tag of the column, always [`ID_TYPE`]
    #[serde(rename = "type", default = "default_reference_type")]
    pub reference_type: String,
}

fn default_reference_type() -> String {
    ID_TYPE.to_string()
}

/// A card descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Descriptor row id
    #[serde(default)]
    pub id: Option<String>,
    /// Card name
    pub name: String,
    /// Registered database holding the table (`None` means `default`)
    #[serde(default)]
    pub db_name: Option<String>,
    /// Physical table
    pub table_name: String,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<Field>,
    /// References in declaration order
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Card {
    /// Create a card with no fields or references
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            db_name: None,
            table_name: table_name.into(),
            fields: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Set the database the card lives in
    pub fn with_database(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    /// Add a field
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        column_name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        self.fields.push(Field {
            id: None,
            name: name.into(),
            column_name: column_name.into(),
            field_type: field_type.into(),
        });
        self
    }

    /// Add a reference
    pub fn with_reference(
        mut self,
        name: impl Into<String>,
        column_name: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        self.references.push(Reference {
            id: None,
            name: name.into(),
            column_name: column_name.into(),
            target_name: target_name.into(),
            reference_type: ID_TYPE.to_string(),
        });
        self
    }

    /// Look up a field by segment name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a reference by segment name
    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Field names followed by reference names, in declaration order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.references.iter().map(|r| r.name.as_str()))
    }

    /// Column backing a writable member (field or reference)
    pub fn member_column(&self, name: &str) -> Option<&str> {
        self.field(name)
            .map(|f| f.column_name.as_str())
            .or_else(|| self.reference(name).map(|r| r.column_name.as_str()))
    }

    /// Check that every physical name is a plain SQL identifier
    pub fn validate(&self) -> Result<()> {
        let check = |what: &str, ident: &str| {
            validate_sql_identifier(ident).map_err(|e| {
                Error::config(format!("card '{}' {}: {}", self.name, what, e))
            })
        };

        check("table", &self.table_name)?;
        for field in &self.fields {
            check("field column", &field.column_name)?;
        }
        for reference in &self.references {
            check("reference column", &reference.column_name)?;
        }
        Ok(())
    }
}

/// Key-value lookup of card descriptors
#[async_trait]
pub trait CardSource: Send + Sync {
    /// Load a descriptor by card name; `Ok(None)` when no such card exists
    async fn load(&self, name: &str) -> Result<Option<Card>>;
}

/// In-memory descriptors
#[derive(Debug, Default, Clone)]
pub struct StaticCardSource {
    cards: HashMap<String, Card>,
}

impl StaticCardSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a card
    pub fn with(mut self, card: Card) -> Self {
        self.insert(card);
        self
    }

    /// Add or replace a card
    pub fn insert(&mut self, card: Card) {
        self.cards.insert(card.name.clone(), card);
    }

    /// Parse a JSON array of card descriptors
    pub fn from_json(json: &str) -> Result<Self> {
        let cards: Vec<Card> = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid card descriptors: {}", e)))?;
        Ok(cards.into_iter().fold(Self::new(), Self::with))
    }
}

#[async_trait]
impl CardSource for StaticCardSource {
    async fn load(&self, name: &str) -> Result<Option<Card>> {
        Ok(self.cards.get(name).cloned())
    }
}

const CARD_SQL: &str = "SELECT ID, MC, BZF, SJK FROM A_KPDY WHERE ISDEL='N' AND MC=?";
const FIELD_SQL: &str = "SELECT ID, MC, BZF, LX FROM A_KPSJ WHERE ISDEL='N' AND KP_ID=?";
const REFERENCE_SQL: &str = "SELECT A.ID, A.MC, A.BZF, B.MC DX_MC FROM A_KPYY A, A_KPDY B \
     WHERE A.KP_ID=? AND A.ISDEL='N' AND B.ISDEL='N' AND A.DX_ID=B.ID";

/// Descriptors read from the card-definition tables
#[derive(Debug, Clone)]
pub struct SqlCardSource {
    database: Arc<Database>,
}

impl SqlCardSource {
    /// Read descriptors from `database`
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get_by_name(column)
        .filter(|v| !v.is_null())
        .and_then(Value::as_string)
}

fn required(row: &Row, column: &str, table: &str) -> Result<String> {
    text(row, column).ok_or_else(|| {
        Error::config(format!(
            "{}.{} is empty in a live descriptor row",
            table, column
        ))
    })
}

#[async_trait]
impl CardSource for SqlCardSource {
    async fn load(&self, name: &str) -> Result<Option<Card>> {
        let cards = self.database.query(CARD_SQL, &[Value::from(name)]).await?;
        let Some(row) = cards.rows.first() else {
            return Ok(None);
        };

        let card_id = required(row, "ID", "A_KPDY")?;
        let mut card = Card {
            id: Some(card_id.clone()),
            name: required(row, "MC", "A_KPDY")?,
            db_name: text(row, "SJK"),
            table_name: required(row, "BZF", "A_KPDY")?,
            fields: Vec::new(),
            references: Vec::new(),
        };

        let params = [Value::from(card_id)];

        for row in self.database.query(FIELD_SQL, &params).await?.rows {
            card.fields.push(Field {
                id: text(&row, "ID"),
                name: required(&row, "MC", "A_KPSJ")?,
                column_name: required(&row, "BZF", "A_KPSJ")?,
                field_type: text(&row, "LX").unwrap_or_default(),
            });
        }

        for row in self.database.query(REFERENCE_SQL, &params).await?.rows {
            let code = required(&row, "BZF", "A_KPYY")?;
            card.references.push(Reference {
                id: text(&row, "ID"),
                name: required(&row, "MC", "A_KPYY")?,
                column_name: format!("{}{}", code, REFERENCE_COLUMN_SUFFIX),
                target_name: required(&row, "DX_MC", "A_KPYY")?,
                reference_type: ID_TYPE.to_string(),
            });
        }

        Ok(Some(card))
    }
}

/// Process-lifetime descriptor cache.
///
/// Concurrent first loads of one name may both reach the source; the first
/// descriptor stored wins and both callers observe it. Entries are only
/// dropped through [`MetadataStore::invalidate`] or [`MetadataStore::clear`].
pub struct MetadataStore {
    source: Arc<dyn CardSource>,
    cache: RwLock<HashMap<String, Arc<Card>>>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Create a store over a descriptor source
    pub fn new(source: Arc<dyn CardSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a card, from cache when possible
    pub async fn load(&self, name: &str) -> Result<Arc<Card>> {
        if let Some(card) = self.cache.read().await.get(name) {
            return Ok(Arc::clone(card));
        }

        let card = self
            .source
            .load(name)
            .await?
            .ok_or_else(|| Error::card_not_found(name))?;
        card.validate()?;
        debug!(
            card = %card.name,
            table = %card.table_name,
            fields = card.fields.len(),
            references = card.references.len(),
            "card loaded"
        );

        let mut cache = self.cache.write().await;
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(card));
        Ok(Arc::clone(entry))
    }

    /// Drop one cached descriptor
    pub async fn invalidate(&self, name: &str) -> bool {
        self.cache.write().await.remove(name).is_some()
    }

    /// Drop every cached descriptor
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Number of cached descriptors
    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }
}
