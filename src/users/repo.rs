use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::db::{schema::User, Filter, Store};
use crate::error::AppResult;
use crate::repository::Repository;

#[derive(Clone)]
pub struct UserRepository {
    repo: Repository<User>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { repo: Repository::new(store) }
    }

    pub fn base(&self) -> &Repository<User> {
        &self.repo
    }

    /// At most one user per email; `None` when absent.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut found = self
            .repo
            .find_where(&Filter::eq("email", json!(email)))
            .await?;
        if found.len() > 1 {
            warn!(%email, count = found.len(), "duplicate users share an email");
        }
        Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{NewUser, ALL_TABLES};
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn find_by_email_hit_and_miss() {
        let users = UserRepository::new(Arc::new(MemoryStore::new(ALL_TABLES)));
        assert!(users.find_by_email("a@b.com").await.unwrap().is_none());

        let created = users
            .base()
            .create(&NewUser { name: "A".into(), email: "a@b.com".into(), ..Default::default() })
            .await
            .unwrap();
        let found = users.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }
}
