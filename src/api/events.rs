//! Secondary event-socket transport.
//!
//! Runs on its own listener with a permissive CORS policy. Each socket carries
//! JSON event frames; a `graphql` event executes its payload against the same
//! schema as `/graphql` and is answered with a `graphql:result` event echoing
//! the request `id`. Callers are always anonymous and subscriptions are not
//! offered here.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::Method,
    response::Response,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::graphql::{AppSchema, RequestContext, Transport};
use crate::state::AppState;

pub const GRAPHQL_EVENT: &str = "graphql";
pub const RESULT_EVENT: &str = "graphql:result";
pub const ERROR_EVENT: &str = "error";

#[derive(Debug, Deserialize)]
struct InboundEvent {
    event: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OutboundEvent {
    pub event: &'static str,
    pub id: Value,
    pub payload: Value,
}

impl OutboundEvent {
    fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            event: ERROR_EVENT,
            id,
            payload: json!({ "message": message.into() }),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(mut socket: WebSocket, state: AppState) {
    let _guard = state.shutdown.track_socket();
    loop {
        let message = tokio::select! {
            message = socket.recv() => message,
            _ = state.shutdown.wait() => {
                tracing::debug!("event socket closed on shutdown");
                break;
            }
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "event socket read failed");
                break;
            }
        };

        let reply = handle_frame(&state.schema, &state.db, text.as_str()).await;
        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode event reply");
                continue;
            }
        };

        if socket.send(Message::Text(encoded.into())).await.is_err() {
            break;
        }
    }
}

pub async fn handle_frame(schema: &AppSchema, db: &PgPool, text: &str) -> OutboundEvent {
    let inbound: InboundEvent = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(err) => return OutboundEvent::error(Value::Null, format!("invalid event frame: {err}")),
    };

    if inbound.event != GRAPHQL_EVENT {
        return OutboundEvent::error(inbound.id, format!("unknown event: {}", inbound.event));
    }

    let request: async_graphql::Request = match serde_json::from_value(inbound.payload) {
        Ok(request) => request,
        Err(err) => return OutboundEvent::error(inbound.id, format!("invalid graphql payload: {err}")),
    };

    let context = RequestContext::anonymous(db.clone(), Transport::EventSocket);
    let response = schema.execute(request.data(context)).await;

    let payload = serde_json::to_value(&response).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize graphql response");
        json!({ "errors": [{ "message": "internal error" }] })
    });

    OutboundEvent {
        event: RESULT_EVENT,
        id: inbound.id,
        payload,
    }
}
