// In-process store honoring the table descriptors: column defaults, NOT NULL, primary and
// unique keys, foreign keys (RESTRICT) and auto-touched columns. Backs tests and local runs
// without Postgres.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::table::{ColumnDefault, TableDef};
use super::{ensure_columns, Filter, Row, Store, StoreError};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<Row>>,
    serials: HashMap<&'static str, i64>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: &'static [&'static TableDef],
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Empty store over `schema`; foreign keys resolve against these tables.
    pub fn new(schema: &'static [&'static TableDef]) -> Self {
        Self {
            schema,
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    pub async fn count(&self, table: &TableDef) -> usize {
        self.tables
            .read()
            .await
            .rows
            .get(table.name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn table(&self, name: &str) -> Option<&'static TableDef> {
        self.schema.iter().copied().find(|t| t.name == name)
    }

    /// Rows in other tables whose foreign keys point at `row`.
    fn first_reference(&self, tables: &Tables, table: &TableDef, row: &Row) -> Option<&'static str> {
        for child in self.schema {
            for fk in child.foreign_keys.iter().filter(|fk| fk.references == table.name) {
                let Some(target) = row.get(fk.referenced_column) else {
                    continue;
                };
                let referenced = tables
                    .rows
                    .get(child.name)
                    .map(|rows| rows.iter().any(|r| r.get(fk.column) == Some(target)))
                    .unwrap_or(false);
                if referenced {
                    return Some(fk.name);
                }
            }
        }
        None
    }

    /// Constraint checks for `row` about to be stored at `position` (None for a new row).
    fn check_row(
        &self,
        tables: &Tables,
        table: &TableDef,
        row: &Row,
        position: Option<usize>,
    ) -> Result<(), StoreError> {
        for col in table.columns.iter().filter(|c| !c.nullable) {
            if row.get(col.name).map_or(true, Value::is_null) {
                return Err(StoreError::Constraint(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    col.name, table.name
                )));
            }
        }

        let existing = tables.rows.get(table.name).map(Vec::as_slice).unwrap_or(&[]);
        let others = existing
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != position)
            .map(|(_, r)| r);

        let mut keys: Vec<(String, &[&str])> = vec![(table.pkey_name(), table.primary_key)];
        keys.extend(table.unique.iter().map(|u| (u.name.to_string(), u.columns)));
        for other in others {
            for (name, cols) in &keys {
                let clash = cols.iter().all(|c| {
                    let v = row.get(*c).unwrap_or(&Value::Null);
                    !v.is_null() && other.get(*c) == Some(v)
                });
                if clash {
                    return Err(StoreError::Constraint(format!(
                        "duplicate key value violates unique constraint \"{name}\""
                    )));
                }
            }
        }

        for fk in table.foreign_keys {
            let value = row.get(fk.column).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let parent = self.table(fk.references).map(|t| t.name).unwrap_or(fk.references);
            let found = tables
                .rows
                .get(parent)
                .map(|rows| rows.iter().any(|r| r.get(fk.referenced_column) == Some(value)))
                .unwrap_or(false);
            if !found {
                return Err(StoreError::Constraint(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                    table.name, fk.name
                )));
            }
        }
        Ok(())
    }
}

fn now_value() -> Result<Value, StoreError> {
    Ok(time::serde::rfc3339::serialize(
        &OffsetDateTime::now_utc(),
        serde_json::value::Serializer,
    )?)
}

/// Postgres-like ordering: timestamps chronologically, numbers numerically, NULL greatest.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            match (
                OffsetDateTime::parse(x, &Rfc3339),
                OffsetDateTime::parse(y, &Rfc3339),
            ) {
                (Ok(dx), Ok(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(
        &self,
        table: &'static TableDef,
        filter: Option<&Filter>,
        order_desc: Option<&'static str>,
    ) -> Result<Vec<Row>, StoreError> {
        if let Some(f) = filter {
            ensure_columns(table, f.0.iter().map(|(c, _)| c))?;
        }
        let tables = self.tables.read().await;
        // Newest insert first, so ties on the ordering column stay newest first too.
        let mut rows: Vec<Row> = tables
            .rows
            .get(table.name)
            .map(|rows| {
                rows.iter()
                    .rev()
                    .filter(|r| filter.map_or(true, |f| f.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(col) = order_desc {
            rows.sort_by(|a, b| {
                compare_values(
                    b.get(col).unwrap_or(&Value::Null),
                    a.get(col).unwrap_or(&Value::Null),
                )
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &'static TableDef, values: Row) -> Result<Row, StoreError> {
        ensure_columns(table, values.keys())?;
        let mut tables = self.tables.write().await;

        let mut row = Row::new();
        for col in table.columns {
            let value = match values.get(col.name) {
                Some(v) => v.clone(),
                None => match col.default {
                    ColumnDefault::None | ColumnDefault::OnUpdate => Value::Null,
                    ColumnDefault::Serial => {
                        let next = tables.serials.entry(table.name).or_insert(0);
                        *next += 1;
                        Value::from(*next)
                    }
                    ColumnDefault::Uuid => Value::String(Uuid::new_v4().to_string()),
                    ColumnDefault::Now => now_value()?,
                },
            };
            row.insert(col.name.to_string(), value);
        }

        self.check_row(&tables, table, &row, None)?;
        tables.rows.entry(table.name).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &'static TableDef,
        filter: &Filter,
        changes: Row,
    ) -> Result<Vec<Row>, StoreError> {
        ensure_columns(table, filter.0.iter().map(|(c, _)| c))?;
        ensure_columns(table, changes.keys())?;
        let mut tables = self.tables.write().await;

        let positions: Vec<usize> = tables
            .rows
            .get(table.name)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, r)| filter.matches(r))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();

        let mut updated = Vec::with_capacity(positions.len());
        for pos in positions {
            let current = tables.rows[table.name][pos].clone();
            let mut next = current.clone();
            for (k, v) in &changes {
                next.insert(k.clone(), v.clone());
            }
            for col in table.touched_columns() {
                next.insert(col.name.to_string(), now_value()?);
            }

            let rekeyed = table
                .primary_key
                .iter()
                .any(|c| current.get(*c) != next.get(*c));
            if rekeyed {
                if let Some(fk) = self.first_reference(&tables, table, &current) {
                    return Err(StoreError::Constraint(format!(
                        "update or delete on table \"{}\" violates foreign key constraint \"{fk}\"",
                        table.name
                    )));
                }
            }
            self.check_row(&tables, table, &next, Some(pos))?;

            if let Some(rows) = tables.rows.get_mut(table.name) {
                rows[pos] = next.clone();
            }
            updated.push(next);
        }
        Ok(updated)
    }

    async fn delete(&self, table: &'static TableDef, filter: &Filter) -> Result<u64, StoreError> {
        ensure_columns(table, filter.0.iter().map(|(c, _)| c))?;
        let mut tables = self.tables.write().await;

        let doomed: Vec<Row> = tables
            .rows
            .get(table.name)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        for row in &doomed {
            if let Some(fk) = self.first_reference(&tables, table, row) {
                return Err(StoreError::Constraint(format!(
                    "update or delete on table \"{}\" violates foreign key constraint \"{fk}\"",
                    table.name
                )));
            }
        }

        let Some(rows) = tables.rows.get_mut(table.name) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }
}
