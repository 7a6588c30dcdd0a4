/*
 * Responsibility
 * - GET|POST /graphql
 * - Decide: docs page / websocket upgrade / single response / multipart stream / 422
 * - Structural checks first, then the request context (identity resolution only when Authorization is present)
 */
use async_graphql::http::GraphiQLSource;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    response::{Html, IntoResponse, Response},
};

use crate::api::graphql::{multipart, websocket};
use crate::error::AppError;
use crate::graphql::{
    ExecutionOutcome, GraphQLHttpRequest, GraphQLParams, RequestContext,
    engine::SingleResponse,
};
use crate::middleware::http::BODY_LIMIT_BYTES;
use crate::state::AppState;

pub const GRAPHQL_ROUTE: &str = "/graphql";

pub async fn graphql(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();

    if is_websocket_upgrade(&parts.headers) {
        return websocket::upgrade(state, &mut parts).await;
    }

    let bytes = match to_bytes(body, BODY_LIMIT_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "failed to read graphql request body");
            return AppError::BadRequest("Request body could not be read.".into()).into_response();
        }
    };

    match GraphQLHttpRequest::from_parts(&parts, &bytes) {
        Ok(request) => dispatch(&state, request).await,
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn dispatch(state: &AppState, request: GraphQLHttpRequest) -> Response {
    if state.engine.should_render_docs(&request) {
        return docs_page(&state.config.subscription_endpoint).into_response();
    }

    let params = match GraphQLParams::from_request(&request) {
        Ok(params) => params,
        Err(err) => return AppError::from(err).into_response(),
    };

    // Structural answers (400/405/422) win over credential problems
    if let Some(outcome) = state.engine.classify(&request, &params) {
        return respond(outcome);
    }

    let context = match RequestContext::from_http(
        &state.identity,
        state.db.clone(),
        &request.method,
        &request.uri,
        &request.headers,
    ) {
        Ok(context) => context,
        Err(err) => {
            tracing::warn!(error = %err, "rejected graphql request context");
            return AppError::from(err).into_response();
        }
    };

    respond(state.engine.execute(&request, params, context).await)
}

fn respond(outcome: ExecutionOutcome) -> Response {
    match outcome {
        ExecutionOutcome::Single(single) => single_response(single),
        ExecutionOutcome::Streaming(chunks) => multipart::response(chunks),
        ExecutionOutcome::PushRequired => AppError::ProtocolMismatch.into_response(),
    }
}

fn docs_page(subscription_endpoint: &str) -> Html<String> {
    Html(
        GraphiQLSource::build()
            .endpoint(GRAPHQL_ROUTE)
            .subscription_endpoint(subscription_endpoint)
            .finish(),
    )
}

fn single_response(single: SingleResponse) -> Response {
    let SingleResponse {
        status,
        headers,
        payload,
    } = single;

    let mut response = (status, Body::from(payload.to_string())).into_response();
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    response
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
