/*
 * Responsibility
 * - URL layout of the main listener
 * - /graphql serves HTTP and WebSocket on the same path
 */
use axum::{Router, routing::get};

use crate::api::graphql::handler::{GRAPHQL_ROUTE, graphql};
use crate::api::health::health;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(GRAPHQL_ROUTE, get(graphql).post(graphql))
}
