use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    db::schema::{NewPost, Post, PostPatch},
    error::{AppError, AppResult},
    rpc::{MutationInput, QueryInput, Rpc},
    state::AppState,
    validation::Validate,
};

#[derive(Debug, Deserialize)]
pub struct UpdatePostInput {
    pub id: i32,
    #[serde(default)]
    pub data: PostPatch,
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub success: bool,
}

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/rpc/post.latestPost", get(latest_post))
        .route("/rpc/post.getById", get(get_by_id))
        .route("/rpc/post.create", post(create))
        .route("/rpc/post.update", post(update))
        .route("/rpc/post.delete", post(delete))
}

#[instrument(skip(state))]
pub async fn latest_post(State(state): State<AppState>) -> AppResult<Rpc<Vec<Post>>> {
    Ok(Rpc(state.posts.list().await?))
}

#[instrument(skip_all, fields(user_id = %auth.user.id, id = id))]
pub async fn get_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    QueryInput(id): QueryInput<i32>,
) -> AppResult<Rpc<Post>> {
    state.posts.get(id).await.map(Rpc).ok_or(AppError::NotFound("Post"))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    MutationInput(input): MutationInput<NewPost>,
) -> AppResult<Rpc<Option<Post>>> {
    input.validate()?;
    Ok(Rpc(state.posts.create(&input).await))
}

#[instrument(skip_all, fields(user_id = %auth.user.id, id = input.id))]
pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    MutationInput(input): MutationInput<UpdatePostInput>,
) -> AppResult<Rpc<Option<Post>>> {
    input.data.validate()?;
    Ok(Rpc(state.posts.update(input.id, &input.data).await))
}

#[instrument(skip_all, fields(user_id = %auth.user.id, id = id))]
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    MutationInput(id): MutationInput<i32>,
) -> AppResult<Rpc<DeleteResult>> {
    Ok(Rpc(DeleteResult { success: state.posts.delete(id).await }))
}
