use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::db::schema::{NewPost, Post, PostPatch};
use crate::db::Store;
use crate::error::AppResult;
use crate::repository::Repository;

/// Post failure policy: a failed read or write is logged and reported as "no result".
pub fn downgrade<T>(op: &'static str, result: AppResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, op, "post operation failed");
            None
        }
    }
}

#[derive(Clone)]
pub struct PostService {
    posts: Repository<Post>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { posts: Repository::new(store) }
    }

    /// Newest first. Errors propagate.
    pub async fn list(&self) -> AppResult<Vec<Post>> {
        self.posts.find_all().await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Option<Post> {
        downgrade("get", self.posts.find_one(&id).await)
    }

    #[instrument(skip(self, data), fields(created_by_id = %data.created_by_id))]
    pub async fn create(&self, data: &NewPost) -> Option<Post> {
        let post = downgrade("create", self.posts.create(data).await)?;
        info!(post_id = post.id, "post created");
        Some(post)
    }

    #[instrument(skip(self, data))]
    pub async fn update(&self, id: i32, data: &PostPatch) -> Option<Post> {
        downgrade("update", self.posts.update(&id, data).await)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> bool {
        downgrade("delete", self.posts.delete(&id).await).is_some()
    }
}
