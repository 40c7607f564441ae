pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::PostService;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::post_routes())
}
