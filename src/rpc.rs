//! Procedure-call plumbing: the success envelope and the two ways a procedure receives input.
//!
//! Queries are `GET /api/rpc/<procedure>?input=<json>`, mutations are `POST` with the JSON input
//! as body. Failures render through [`AppError`] as `{"error":{"code","message"}}`.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::AppError;

/// Successful procedure output, rendered as `{"result":{"data": ...}}`.
#[derive(Debug)]
pub struct Rpc<T>(pub T);

#[derive(Serialize)]
struct Envelope<T> {
    result: Data<T>,
}

#[derive(Serialize)]
struct Data<T> {
    data: T,
}

impl<T: Serialize> IntoResponse for Rpc<T> {
    fn into_response(self) -> Response {
        Json(Envelope { result: Data { data: self.0 } }).into_response()
    }
}

#[derive(Deserialize)]
struct RawInput {
    input: Option<String>,
}

/// Query input, read from the `input` query parameter.
#[derive(Debug)]
pub struct QueryInput<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryInput<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<RawInput>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::validation(e.body_text()))?;
        let text = raw.input.as_deref().unwrap_or("null");
        serde_json::from_str(text)
            .map(QueryInput)
            .map_err(|e| AppError::validation(format!("invalid input: {e}")))
    }
}

/// Mutation input, read from the JSON body.
#[derive(Debug)]
pub struct MutationInput<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for MutationInput<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        Ok(MutationInput(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request as HttpRequest, StatusCode};

    #[tokio::test]
    async fn success_envelope_shape() {
        let resp = Rpc(vec![1, 2]).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v, serde_json::json!({"result": {"data": [1, 2]}}));
    }

    async fn query<T: DeserializeOwned>(uri: &str) -> Result<T, AppError> {
        let req = HttpRequest::builder().uri(uri).body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        QueryInput::<T>::from_request_parts(&mut parts, &()).await.map(|q| q.0)
    }

    #[tokio::test]
    async fn query_input_is_url_encoded_json() {
        assert_eq!(query::<i32>("/p?input=7").await.unwrap(), 7);
        assert_eq!(
            query::<String>("/p?input=%22a%40b.com%22").await.unwrap(),
            "a@b.com"
        );
        assert!(query::<Option<i32>>("/p").await.unwrap().is_none());
        assert!(matches!(query::<i32>("/p").await, Err(AppError::Validation(_))));
        assert!(matches!(query::<i32>("/p?input=abc").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn mutation_input_rejects_bad_json() {
        let req = HttpRequest::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{nope"))
            .unwrap();
        let err = MutationInput::<i32>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
