use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{CredentialsInput, SessionResponse, SignInResponse, SignOutResponse};
use super::extractors::AuthUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/callback/credentials", post(credentials))
        .route("/auth/session", get(session))
        .route("/auth/signout", post(sign_out))
}

#[instrument(skip(state, payload))]
pub async fn credentials(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsInput>, axum::extract::rejection::JsonRejection>,
) -> AppResult<Json<SignInResponse>> {
    let Json(input) = payload.map_err(|e| AppError::validation(e.body_text()))?;
    Ok(Json(state.auth.authorize(input).await?))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn session(auth: AuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: auth.user,
        expires: auth.expires,
    })
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn sign_out(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<SignOutResponse>> {
    state.auth.sign_out(&auth.token).await?;
    Ok(Json(SignOutResponse { success: true }))
}
