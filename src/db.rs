use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::AppConfig;

pub mod memory;
pub mod pg;
pub mod schema;
pub mod table;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use table::TableDef;

/// One materialized row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the write (unique, foreign key, not null, check).
    #[error("{0}")]
    Constraint(String),

    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: &'static str, column: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Conjunction of `column = value` terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(pub Vec<(String, Value)>);

impl Filter {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self(vec![(column.into(), value)])
    }

    pub fn and(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.push((column.into(), value));
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(col, val)| row.get(col).unwrap_or(&Value::Null) == val)
    }
}

/// The relational store every repository writes through.
///
/// Rows travel as JSON objects so one implementation serves every entity table.
#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching `filter` (all rows when `None`), newest first by `order_desc` when given.
    async fn select(
        &self,
        table: &'static TableDef,
        filter: Option<&Filter>,
        order_desc: Option<&'static str>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert one row; absent columns take their store defaults.
    async fn insert(&self, table: &'static TableDef, values: Row) -> Result<Row, StoreError>;

    /// Apply `changes` to matching rows and touch auto-updated columns.
    async fn update(
        &self,
        table: &'static TableDef,
        filter: &Filter,
        changes: Row,
    ) -> Result<Vec<Row>, StoreError>;

    /// Remove matching rows, returning how many went away.
    async fn delete(&self, table: &'static TableDef, filter: &Filter) -> Result<u64, StoreError>;
}

/// Refuse column names the table does not declare; identifiers are spliced into SQL.
pub(crate) fn ensure_columns<'a>(
    table: &'static TableDef,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<(), StoreError> {
    for name in names {
        if !table.has_column(name) {
            return Err(StoreError::UnknownColumn {
                table: table.name,
                column: name.clone(),
            });
        }
    }
    Ok(())
}

/// Schema shipped with the crate.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// The server must not start against a missing or partial schema.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    MIGRATOR.run(pool).await.context("run migrations")
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}
