use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::db::{schema::Entity, Filter, Row, Store, TableDef};
use crate::error::{AppError, AppResult};

/// Column `find_all` orders by, newest first, when the table has it.
pub const DEFAULT_ORDER_COLUMN: &str = "created_at";

/// CRUD over one entity table, composed from the entity's table descriptor.
pub struct Repository<E: Entity> {
    store: Arc<dyn Store>,
    table: &'static TableDef,
    order_column: &'static str,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table,
            order_column: self.order_column,
            _entity: PhantomData,
        }
    }
}

fn to_row<T: Serialize>(value: &T) -> AppResult<Row> {
    match serde_json::to_value(value).map_err(anyhow::Error::from)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Internal(anyhow::anyhow!(
            "expected an object, got {other}"
        ))),
    }
}

/// Null, empty string and zero never name a row; serial keys start at 1.
fn is_blank_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_i64() == Some(0),
        _ => false,
    }
}

fn decode<E: Entity>(row: Row) -> AppResult<E> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("decode {} row: {e}", E::NAME)))
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            table: E::TABLE,
            order_column: DEFAULT_ORDER_COLUMN,
            _entity: PhantomData,
        }
    }

    pub fn with_order_column(mut self, column: &'static str) -> Self {
        self.order_column = column;
        self
    }

    pub fn table(&self) -> &'static TableDef {
        self.table
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Primary-key filter; a composite key is a JSON array in key-column order.
    fn key_filter(&self, id: &E::Key) -> AppResult<Filter> {
        let value = serde_json::to_value(id).map_err(anyhow::Error::from)?;
        let missing = || AppError::InvalidArgument("Id is required".into());
        let pk = self.table.primary_key;
        if pk.len() == 1 {
            if is_blank_key(&value) {
                return Err(missing());
            }
            return Ok(Filter::eq(pk[0], value));
        }
        match value {
            Value::Array(parts) if parts.len() == pk.len() => {
                if parts.iter().any(is_blank_key) {
                    return Err(missing());
                }
                Ok(Filter(
                    pk.iter().map(|c| c.to_string()).zip(parts).collect(),
                ))
            }
            _ => Err(missing()),
        }
    }

    /// Rows matching `filter`, decoded.
    pub async fn find_where(&self, filter: &Filter) -> AppResult<Vec<E>> {
        let rows = self.store.select(self.table, Some(filter), None).await?;
        rows.into_iter().map(decode::<E>).collect()
    }

    #[instrument(skip(self), fields(table = self.table.name))]
    pub async fn find_all(&self) -> AppResult<Vec<E>> {
        let order = self
            .table
            .has_column(self.order_column)
            .then_some(self.order_column);
        let rows = self.store.select(self.table, None, order).await?;
        rows.into_iter().map(decode::<E>).collect()
    }

    #[instrument(skip(self), fields(table = self.table.name))]
    pub async fn find_one(&self, id: &E::Key) -> AppResult<E> {
        let filter = self.key_filter(id)?;
        let mut rows = self.store.select(self.table, Some(&filter), None).await?;
        match rows.pop() {
            Some(row) => decode(row),
            None => Err(AppError::NotFound(E::NAME)),
        }
    }

    /// `find_one` with a miss as `None`.
    pub async fn find_optional(&self, id: &E::Key) -> AppResult<Option<E>> {
        match self.find_one(id).await {
            Ok(row) => Ok(Some(row)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, data), fields(table = self.table.name))]
    pub async fn create(&self, data: &E::New) -> AppResult<E> {
        let row = self.store.insert(self.table, to_row(data)?).await?;
        decode(row)
    }

    /// Existence check, then a partial write. Not atomic: a concurrent delete between the two
    /// surfaces as `NotFound`.
    #[instrument(skip(self, data), fields(table = self.table.name))]
    pub async fn update(&self, id: &E::Key, data: &E::Patch) -> AppResult<E> {
        self.find_one(id).await?;
        let filter = self.key_filter(id)?;
        let mut rows = self.store.update(self.table, &filter, to_row(data)?).await?;
        match rows.pop() {
            Some(row) => decode(row),
            None => Err(AppError::NotFound(E::NAME)),
        }
    }

    /// Idempotent: deleting a missing row is not an error.
    #[instrument(skip(self), fields(table = self.table.name))]
    pub async fn delete(&self, id: &E::Key) -> AppResult<()> {
        let filter = self.key_filter(id)?;
        let removed = self.store.delete(self.table, &filter).await?;
        debug!(removed, "delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{
        NewPost, NewUser, Post, PostPatch, User, VerificationToken, ALL_TABLES,
    };
    use crate::db::MemoryStore;
    use time::{Duration, OffsetDateTime};

    fn store() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new(ALL_TABLES))
    }

    async fn owner(store: &Arc<dyn Store>) -> User {
        Repository::<User>::new(store.clone())
            .create(&NewUser {
                name: "Owner".into(),
                email: "owner@example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn new_post(owner: &User, name: &str) -> NewPost {
        NewPost {
            name: name.into(),
            content: "World".into(),
            created_by_id: owner.id.clone(),
        }
    }

    #[tokio::test]
    async fn create_returns_store_materialized_row() {
        let store = store();
        let user = owner(&store).await;
        assert!(!user.id.is_empty());
        assert!(user.email_verified.is_some());

        let posts = Repository::<Post>::new(store);
        let post = posts.create(&new_post(&user, "Hello")).await.unwrap();
        assert_eq!(post.id, 1);
        assert_eq!(post.created_by_id, user.id);
    }

    #[tokio::test]
    async fn find_all_is_newest_first_and_empty_is_ok() {
        let store = store();
        let posts = Repository::<Post>::new(store.clone());
        assert!(posts.find_all().await.unwrap().is_empty());

        let user = owner(&store).await;
        posts.create(&new_post(&user, "first")).await.unwrap();
        posts.create(&new_post(&user, "second")).await.unwrap();
        let names: Vec<_> = posts.find_all().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn find_one_misses_and_empty_ids() {
        let users = Repository::<User>::new(store());
        assert!(matches!(
            users.find_one(&"missing".to_string()).await,
            Err(AppError::NotFound("User"))
        ));
        assert!(matches!(
            users.find_one(&String::new()).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn zero_is_not_a_serial_id() {
        let posts = Repository::<Post>::new(store());
        assert!(matches!(posts.find_one(&0).await, Err(AppError::InvalidArgument(_))));
        assert!(matches!(posts.delete(&0).await, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_find_one_then_misses() {
        let store = store();
        let user = owner(&store).await;
        let posts = Repository::<Post>::new(store);
        let post = posts.create(&new_post(&user, "gone")).await.unwrap();

        posts.delete(&post.id).await.unwrap();
        assert!(matches!(posts.find_one(&post.id).await, Err(AppError::NotFound(_))));
        posts.delete(&post.id).await.unwrap();
    }

    #[tokio::test]
    async fn empty_update_preserves_fields() {
        let store = store();
        let user = owner(&store).await;
        let posts = Repository::<Post>::new(store);
        let created = posts.create(&new_post(&user, "keep")).await.unwrap();

        let updated = posts.update(&created.id, &PostPatch::default()).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.content, created.content);
        assert_eq!(updated.created_by_id, created.created_by_id);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn partial_update_touches_only_given_fields() {
        let store = store();
        let user = owner(&store).await;
        let posts = Repository::<Post>::new(store);
        let created = posts.create(&new_post(&user, "old")).await.unwrap();

        assert!(created.updated_at.is_none());

        let patch = PostPatch { name: Some("new".into()), ..Default::default() };
        let updated = posts.update(&created.id, &patch).await.unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(updated.content, "World");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let posts = Repository::<Post>::new(store());
        let err = posts.update(&99, &PostPatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Post")));
    }

    #[tokio::test]
    async fn store_rejection_is_constraint_violation() {
        let posts = Repository::<Post>::new(store());
        let orphan = NewPost {
            name: "n".into(),
            content: "c".into(),
            created_by_id: "ghost".into(),
        };
        assert!(matches!(
            posts.create(&orphan).await,
            Err(AppError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn composite_keys_round_trip() {
        let tokens = Repository::<VerificationToken>::new(store());
        let vt = VerificationToken {
            identifier: "a@b.com".into(),
            token: "t0k".into(),
            expires: OffsetDateTime::now_utc() + Duration::hours(1),
        };
        tokens.create(&vt).await.unwrap();
        let key = ("a@b.com".to_string(), "t0k".to_string());
        assert_eq!(tokens.find_one(&key).await.unwrap().token, "t0k");
        let empty = (String::new(), "t0k".to_string());
        assert!(matches!(tokens.find_one(&empty).await, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn order_column_is_ignored_when_absent() {
        let tokens = Repository::<VerificationToken>::new(store()).with_order_column("expires");
        assert!(tokens.find_all().await.unwrap().is_empty());
        let users = Repository::<User>::new(store());
        assert!(users.find_all().await.unwrap().is_empty());
    }
}
