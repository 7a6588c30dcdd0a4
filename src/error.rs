/*
 * Responsibility
 * - Errors the transport layer answers by itself (never reaching the engine)
 * - IntoResponse with a GraphQL-shaped body: { "errors": [{ "message": ... }] }
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::graphql::engine::RequestError;
use crate::services::auth::AuthError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Serialize)]
pub struct ErrorExtensions {
    pub code: &'static str,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Subscriptions should be sent over WebSocket.")]
    ProtocolMismatch,
    #[error("{0}")]
    BadRequest(String),
    // Context construction failed; reported like any other GraphQL error
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::ProtocolMismatch => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Unauthenticated(_) => (StatusCode::OK, Some("UNAUTHENTICATED")),
        };

        let body = ErrorResponse {
            errors: vec![ErrorBody {
                message: self.to_string(),
                extensions: code.map(|code| ErrorExtensions { code }),
            }],
        };

        (status, Json(body)).into_response()
    }
}

impl From<RequestError> for AppError {
    fn from(e: RequestError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;

    async fn body_json(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn protocol_mismatch_is_422_with_fixed_body() {
        let res = AppError::ProtocolMismatch.into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(res).await,
            json!({ "errors": [{ "message": "Subscriptions should be sent over WebSocket." }] })
        );
    }

    #[tokio::test]
    async fn auth_failures_are_graphql_errors() {
        let res = AppError::from(AuthError::InvalidToken).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await,
            json!({ "errors": [{
                "message": "invalid token",
                "extensions": { "code": "UNAUTHENTICATED" }
            }] })
        );
    }

    #[tokio::test]
    async fn request_errors_are_400() {
        let res = AppError::from(RequestError::InvalidVariables).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await,
            json!({ "errors": [{ "message": "Variables are invalid JSON." }] })
        );
    }
}
