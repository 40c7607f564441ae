use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::state::AppState;
use crate::users::dto::PublicUser;

/// The signed-in caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: PublicUser,
    pub expires: OffsetDateTime,
    pub token: String,
}

fn bearer(parts: &Parts) -> Result<&str, AppError> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("invalid auth scheme"))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?;
        state.auth.resolve(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_scheme_is_required() {
        assert_eq!(bearer(&parts(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer(&parts(Some("bearer abc"))).unwrap(), "abc");
        assert!(bearer(&parts(Some("Basic abc"))).is_err());
        assert!(bearer(&parts(Some("Bearer "))).is_err());
        assert!(bearer(&parts(None)).is_err());
    }
}
