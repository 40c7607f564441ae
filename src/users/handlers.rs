use axum::{extract::State, routing::get, Router};
use tracing::instrument;

use super::dto::PublicUser;
use crate::{
    auth::AuthUser,
    error::AppResult,
    rpc::{QueryInput, Rpc},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/rpc/user.findByEmail", get(find_by_email))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn find_by_email(
    State(state): State<AppState>,
    auth: AuthUser,
    QueryInput(email): QueryInput<String>,
) -> AppResult<Rpc<Option<PublicUser>>> {
    let user = state.users.get_by_email(&email).await?;
    Ok(Rpc(user.map(PublicUser::from)))
}
