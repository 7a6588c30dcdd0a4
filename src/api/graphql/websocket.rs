/*
 * Responsibility
 * - WebSocket upgrade on /graphql (graphql-ws / subscriptions-transport-ws)
 * - Identity comes from the handshake params (authToken), not per-message headers
 * - A rejected authToken keeps the socket open; each operation on it fails instead
 * - Per-subscribe parsing/validation is done by async-graphql; errors go back on that operation
 */
use async_graphql::{Data, http::ALL_WEBSOCKET_PROTOCOLS};
use async_graphql_axum::{GraphQLProtocol, GraphQLWebSocket};
use axum::{
    extract::{FromRequestParts, WebSocketUpgrade, ws::WebSocket},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;

use crate::graphql::{RejectedCredential, RequestContext, Transport};
use crate::services::auth::IdentityResolver;
use crate::state::AppState;

pub async fn upgrade(state: AppState, parts: &mut Parts) -> Response {
    let protocol = match GraphQLProtocol::from_request_parts(parts, &state).await {
        Ok(protocol) => protocol,
        Err(rejection) => return rejection.into_response(),
    };
    let upgrade = match WebSocketUpgrade::from_request_parts(parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| serve(socket, state, protocol))
}

async fn serve(socket: WebSocket, state: AppState, protocol: GraphQLProtocol) {
    let _guard = state.shutdown.track_socket();
    let resolver = state.identity.clone();
    let db = state.db.clone();

    let connection = GraphQLWebSocket::new(socket, state.schema.clone(), protocol)
        .on_connection_init(move |params| async move {
            Ok(connection_data(&resolver, db, &params))
        })
        .serve();

    tokio::select! {
        _ = connection => tracing::debug!("websocket connection closed"),
        _ = state.shutdown.wait() => tracing::debug!("websocket connection disposed on shutdown"),
    }
}

/// Session data for one connection. Operations read the context from here.
fn connection_data(resolver: &IdentityResolver, db: PgPool, params: &serde_json::Value) -> Data {
    let mut data = Data::default();

    match RequestContext::from_connection_params(resolver, db.clone(), params) {
        Ok(context) => {
            tracing::debug!(
                authenticated = context.identity.is_some(),
                "websocket connection initialised"
            );
            data.insert(context);
        }
        Err(err) => {
            tracing::warn!(error = %err, "websocket authToken rejected");
            data.insert(RequestContext::anonymous(db, Transport::WebSocket));
            data.insert(RejectedCredential(err));
        }
    }

    data
}
