// Postgres store over a sqlx pool.
//
// Values cross the wire as one JSONB parameter and are typed by the table's own row type via
// `jsonb_populate_record(NULL::table, $n)`; rows come back as `to_jsonb(t)`.

use async_trait::async_trait;
use sqlx::{error::ErrorKind, types::Json, PgPool};
use tracing::debug;

use super::table::{quote_ident, TableDef};
use super::{ensure_columns, Filter, Row, Store, StoreError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_rows(&self, sql: &str, params: &[Row]) -> Result<Vec<Row>, StoreError> {
        debug!(%sql, "store query");
        let mut query = sqlx::query_scalar::<_, Json<Row>>(sql);
        for p in params {
            query = query.bind(Json(p.clone()));
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_error)?;
        Ok(rows.into_iter().map(|Json(r)| r).collect())
    }
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => {
                return StoreError::Constraint(db.message().to_string());
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn record(table: &TableDef, param: usize) -> String {
    format!("jsonb_populate_record(NULL::{}, ${param})", quote_ident(table.name))
}

fn filter_row(filter: &Filter) -> Row {
    filter.0.iter().cloned().collect()
}

fn match_clause(filter: &Filter) -> String {
    if filter.0.is_empty() {
        return "TRUE".into();
    }
    filter
        .0
        .iter()
        .map(|(c, _)| format!("t.{col} = f.{col}", col = quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub(crate) fn select_sql(
    table: &TableDef,
    filter: Option<&Filter>,
    order_desc: Option<&str>,
) -> String {
    let mut sql = format!("SELECT to_jsonb(t) FROM {} AS t", quote_ident(table.name));
    if let Some(f) = filter {
        sql.push_str(&format!(", {} AS f WHERE {}", record(table, 1), match_clause(f)));
    }
    if let Some(col) = order_desc {
        sql.push_str(&format!(" ORDER BY t.{} DESC", quote_ident(col)));
    }
    sql
}

pub(crate) fn insert_sql(table: &TableDef, values: &Row) -> String {
    let name = quote_ident(table.name);
    if values.is_empty() {
        return format!("INSERT INTO {name} AS t DEFAULT VALUES RETURNING to_jsonb(t)");
    }
    let cols = values
        .keys()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {name} AS t ({cols}) SELECT {cols} FROM {} RETURNING to_jsonb(t)",
        record(table, 1)
    )
}

/// `None` when there is nothing to assign.
pub(crate) fn update_sql(table: &TableDef, filter: &Filter, changes: &Row) -> Option<String> {
    let mut sets: Vec<String> = changes
        .keys()
        .map(|c| format!("{col} = p.{col}", col = quote_ident(c)))
        .collect();
    sets.extend(
        table
            .touched_columns()
            .filter(|c| !changes.contains_key(c.name))
            .map(|c| format!("{} = now()", quote_ident(c.name))),
    );
    if sets.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {} AS t SET {} FROM {} AS p, {} AS f WHERE {} RETURNING to_jsonb(t)",
        quote_ident(table.name),
        sets.join(", "),
        record(table, 1),
        record(table, 2),
        match_clause(filter)
    ))
}

pub(crate) fn delete_sql(table: &TableDef, filter: &Filter) -> String {
    format!(
        "DELETE FROM {} AS t USING {} AS f WHERE {}",
        quote_ident(table.name),
        record(table, 1),
        match_clause(filter)
    )
}

#[async_trait]
impl Store for PgStore {
    async fn select(
        &self,
        table: &'static TableDef,
        filter: Option<&Filter>,
        order_desc: Option<&'static str>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut params = Vec::new();
        if let Some(f) = filter {
            ensure_columns(table, f.0.iter().map(|(c, _)| c))?;
            params.push(filter_row(f));
        }
        let sql = select_sql(table, filter, order_desc);
        self.fetch_rows(&sql, &params).await
    }

    async fn insert(&self, table: &'static TableDef, values: Row) -> Result<Row, StoreError> {
        ensure_columns(table, values.keys())?;
        let sql = insert_sql(table, &values);
        let params = if values.is_empty() { vec![] } else { vec![values] };
        let mut rows = self.fetch_rows(&sql, &params).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn update(
        &self,
        table: &'static TableDef,
        filter: &Filter,
        changes: Row,
    ) -> Result<Vec<Row>, StoreError> {
        ensure_columns(table, filter.0.iter().map(|(c, _)| c))?;
        ensure_columns(table, changes.keys())?;
        match update_sql(table, filter, &changes) {
            Some(sql) => self.fetch_rows(&sql, &[changes, filter_row(filter)]).await,
            None => self.select(table, Some(filter), None).await,
        }
    }

    async fn delete(&self, table: &'static TableDef, filter: &Filter) -> Result<u64, StoreError> {
        ensure_columns(table, filter.0.iter().map(|(c, _)| c))?;
        let sql = delete_sql(table, filter);
        debug!(%sql, "store delete");
        let done = sqlx::query(&sql)
            .bind(Json(filter_row(filter)))
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(done.rows_affected())
    }
}
