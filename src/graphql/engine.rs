//! The seam between the HTTP dispatcher and whatever executes GraphQL.
//!
//! The dispatcher hands the engine a transport-neutral view of the request and
//! gets back one of three closed outcomes. Production runs [`SchemaEngine`]
//! over the async-graphql schema.

use std::collections::HashMap;

use async_graphql::Variables;
use async_graphql::parser::{
    parse_query,
    types::{DocumentOperations, OperationType},
};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header, request::Parts};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use serde_json::json;
use thiserror::Error;

use crate::graphql::{context::RequestContext, schema::AppSchema};

/// An HTTP request reduced to what classification and parameter extraction need.
#[derive(Debug, Clone)]
pub struct GraphQLHttpRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("POST body sent invalid JSON.")]
    InvalidBody,
    #[error("Variables are invalid JSON.")]
    InvalidVariables,
}

impl GraphQLHttpRequest {
    pub fn from_parts(parts: &Parts, body: &[u8]) -> Result<Self, RequestError> {
        let query = url::form_urlencoded::parse(parts.uri.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();

        let body = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(serde_json::from_slice(body).map_err(|_| RequestError::InvalidBody)?)
        };

        Ok(Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            query,
            body,
        })
    }

    fn accepts(&self, media_type: &str) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains(media_type))
    }
}

/// Operation name, document and variables of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQLParams {
    pub query: Option<String>,
    pub operation_name: Option<String>,
    pub variables: Option<serde_json::Value>,
}

impl GraphQLParams {
    /// Body fields win; URL query parameters are the fallback (and the only
    /// source for GET).
    pub fn from_request(request: &GraphQLHttpRequest) -> Result<Self, RequestError> {
        let field = |name: &str| -> Option<serde_json::Value> {
            request
                .body
                .as_ref()
                .and_then(|b| b.get(name))
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| request.query.get(name).cloned().map(serde_json::Value::String))
        };

        let as_string = |value: Option<serde_json::Value>| match value {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };

        let variables = match field("variables") {
            Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => None,
            Some(serde_json::Value::String(raw)) => {
                Some(serde_json::from_str(&raw).map_err(|_| RequestError::InvalidVariables)?)
            }
            other => other,
        };

        Ok(Self {
            query: as_string(field("query")),
            operation_name: as_string(field("operationName")),
            variables,
        })
    }
}

#[derive(Debug)]
pub struct SingleResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: serde_json::Value,
}

impl SingleResponse {
    pub fn json(status: StatusCode, payload: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            payload,
        }
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, json!({ "errors": [{ "message": message }] }))
    }
}

/// What the engine made of a request.
pub enum ExecutionOutcome {
    /// One payload with the status and headers to send.
    Single(SingleResponse),
    /// Incremental payloads, in order, until the stream ends.
    Streaming(BoxStream<'static, serde_json::Value>),
    /// The operation needs a persistent connection.
    PushRequired,
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Whether the request is a browser asking for the interactive docs page.
    fn should_render_docs(&self, request: &GraphQLHttpRequest) -> bool {
        request.method == Method::GET
            && request.accepts("text/html")
            && !request.query.contains_key("query")
    }

    /// Outcome decided from the request shape alone (missing document, wrong
    /// method, wrong transport). Runs before any context is built, so these
    /// answers never depend on the caller's credentials.
    fn classify(
        &self,
        _request: &GraphQLHttpRequest,
        _params: &GraphQLParams,
    ) -> Option<ExecutionOutcome> {
        None
    }

    async fn execute(
        &self,
        request: &GraphQLHttpRequest,
        params: GraphQLParams,
        context: RequestContext,
    ) -> ExecutionOutcome;
}

/// [`ExecutionEngine`] backed by the application schema.
#[derive(Clone)]
pub struct SchemaEngine {
    schema: AppSchema,
}

impl SchemaEngine {
    pub fn new(schema: AppSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl ExecutionEngine for SchemaEngine {
    fn classify(
        &self,
        request: &GraphQLHttpRequest,
        params: &GraphQLParams,
    ) -> Option<ExecutionOutcome> {
        let Some(query) = params.query.as_deref().filter(|q| !q.trim().is_empty()) else {
            return Some(missing_query());
        };

        match operation_type(query, params.operation_name.as_deref()) {
            Some(OperationType::Mutation) if request.method == Method::GET => {
                let mut single = SingleResponse::error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Can only perform a mutation operation from a POST request.",
                );
                single
                    .headers
                    .insert(header::ALLOW, HeaderValue::from_static("POST"));
                Some(ExecutionOutcome::Single(single))
            }
            // Subscriptions only run over a persistent connection
            Some(OperationType::Subscription) => Some(ExecutionOutcome::PushRequired),
            _ => None,
        }
    }

    async fn execute(
        &self,
        request: &GraphQLHttpRequest,
        params: GraphQLParams,
        context: RequestContext,
    ) -> ExecutionOutcome {
        if let Some(outcome) = self.classify(request, &params) {
            return outcome;
        }
        let Some(query) = params.query else {
            return missing_query();
        };

        let mut gql = async_graphql::Request::new(query).data(context);
        if let Some(name) = params.operation_name {
            gql = gql.operation_name(name);
        }
        if let Some(variables) = params.variables {
            gql = gql.variables(Variables::from_json(variables));
        }

        if request.accepts("multipart/mixed") {
            // One part; execution starts when the body is first polled
            let schema = self.schema.clone();
            let chunk = stream::once(async move { response_payload(&schema.execute(gql).await) });
            return ExecutionOutcome::Streaming(chunk.boxed());
        }

        let res = self.schema.execute(gql).await;
        ExecutionOutcome::Single(SingleResponse::json(
            StatusCode::OK,
            response_payload(&res),
        ))
    }
}

fn missing_query() -> ExecutionOutcome {
    ExecutionOutcome::Single(SingleResponse::error(
        StatusCode::BAD_REQUEST,
        "Must provide query string.",
    ))
}

/// Type of the operation that would run, if the document parses and the
/// selection is unambiguous. Anything else is left for the schema to report.
fn operation_type(query: &str, operation_name: Option<&str>) -> Option<OperationType> {
    let document = parse_query(query).ok()?;
    match &document.operations {
        DocumentOperations::Single(op) => Some(op.node.ty),
        DocumentOperations::Multiple(ops) => match operation_name {
            Some(name) => ops
                .iter()
                .find(|(n, _)| n.as_str() == name)
                .map(|(_, op)| op.node.ty),
            None if ops.len() == 1 => ops.values().next().map(|op| op.node.ty),
            None => None,
        },
    }
}

fn response_payload(res: &async_graphql::Response) -> serde_json::Value {
    serde_json::to_value(res).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize graphql response");
        json!({ "errors": [{ "message": "internal error" }] })
    })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::graphql::{context::Transport, feed::PostFeed, schema::build_schema};

    fn request(method: Method, uri: &str, accept: Option<&str>, body: &str) -> GraphQLHttpRequest {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        GraphQLHttpRequest::from_parts(&parts, body.as_bytes()).unwrap()
    }

    fn context() -> RequestContext {
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        RequestContext::anonymous(db, Transport::Http)
    }

    struct Noop;

    #[async_trait]
    impl ExecutionEngine for Noop {
        async fn execute(
            &self,
            _request: &GraphQLHttpRequest,
            _params: GraphQLParams,
            _context: RequestContext,
        ) -> ExecutionOutcome {
            ExecutionOutcome::PushRequired
        }
    }

    #[test]
    fn docs_page_only_for_browser_gets_without_query() {
        let engine = Noop;
        assert!(engine.should_render_docs(&request(
            Method::GET,
            "/graphql",
            Some("text/html,application/xhtml+xml"),
            ""
        )));
        assert!(!engine.should_render_docs(&request(
            Method::GET,
            "/graphql?query=%7B__typename%7D",
            Some("text/html"),
            ""
        )));
        assert!(!engine.should_render_docs(&request(
            Method::GET,
            "/graphql",
            Some("application/json"),
            ""
        )));
        assert!(!engine.should_render_docs(&request(
            Method::POST,
            "/graphql",
            Some("text/html"),
            "{}"
        )));
    }

    #[test]
    fn get_params_come_from_the_query_string() {
        let req = request(
            Method::GET,
            "/graphql?query=query%20Q%20%7Bme%7Bid%7D%7D&operationName=Q&variables=%7B%22a%22%3A1%7D",
            None,
            "",
        );
        let params = GraphQLParams::from_request(&req).unwrap();

        assert_eq!(params.query.as_deref(), Some("query Q {me{id}}"));
        assert_eq!(params.operation_name.as_deref(), Some("Q"));
        assert_eq!(params.variables, Some(json!({ "a": 1 })));
    }

    #[test]
    fn post_params_come_from_the_body() {
        let req = request(
            Method::POST,
            "/graphql?operationName=Ignored",
            None,
            r#"{"query":"{ __typename }","operationName":"Named","variables":{"x":"y"}}"#,
        );
        let params = GraphQLParams::from_request(&req).unwrap();

        assert_eq!(params.query.as_deref(), Some("{ __typename }"));
        assert_eq!(params.operation_name.as_deref(), Some("Named"));
        assert_eq!(params.variables, Some(json!({ "x": "y" })));
    }

    #[test]
    fn broken_input_is_reported() {
        let req = request(Method::GET, "/graphql?query=%7Ba%7D&variables=%7Bnope", None, "");
        assert_eq!(
            GraphQLParams::from_request(&req),
            Err(RequestError::InvalidVariables)
        );

        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri("/graphql")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(
            GraphQLHttpRequest::from_parts(&parts, b"{not json").err(),
            Some(RequestError::InvalidBody)
        );
    }

    #[test]
    fn operation_type_follows_operation_name() {
        let doc = "query A { __typename } subscription B { postCreated { id } }";
        assert_eq!(operation_type(doc, Some("A")), Some(OperationType::Query));
        assert_eq!(operation_type(doc, Some("B")), Some(OperationType::Subscription));
        assert_eq!(operation_type(doc, None), None);
        assert_eq!(operation_type("{", None), None);
    }

    #[tokio::test]
    async fn missing_query_is_a_bad_request() {
        let engine = SchemaEngine::new(build_schema(PostFeed::new()));
        let req = request(Method::POST, "/graphql", None, "{}");

        let outcome = engine
            .execute(&req, GraphQLParams::default(), context())
            .await;
        let ExecutionOutcome::Single(single) = outcome else {
            panic!("expected a single response");
        };
        assert_eq!(single.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            single.payload,
            json!({ "errors": [{ "message": "Must provide query string." }] })
        );
    }

    #[tokio::test]
    async fn mutations_over_get_are_refused() {
        let engine = SchemaEngine::new(build_schema(PostFeed::new()));
        let req = request(Method::GET, "/graphql", None, "");
        let params = GraphQLParams {
            query: Some(r#"mutation { createPost(title: "a", content: "b") { id } }"#.into()),
            ..Default::default()
        };

        let ExecutionOutcome::Single(single) = engine.execute(&req, params, context()).await else {
            panic!("expected a single response");
        };
        assert_eq!(single.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(single.headers.get(header::ALLOW).unwrap(), "POST");
    }

    #[tokio::test]
    async fn subscriptions_always_need_a_push_transport() {
        let engine = SchemaEngine::new(build_schema(PostFeed::new()));
        let params = GraphQLParams {
            query: Some("subscription { postCreated { id } }".into()),
            ..Default::default()
        };

        for accept in [None, Some("multipart/mixed")] {
            let req = request(Method::POST, "/graphql", accept, "");
            assert!(matches!(
                engine.classify(&req, &params),
                Some(ExecutionOutcome::PushRequired)
            ));
            assert!(matches!(
                engine.execute(&req, params.clone(), context()).await,
                ExecutionOutcome::PushRequired
            ));
        }
    }

    #[test]
    fn plain_queries_are_left_to_execution() {
        let engine = SchemaEngine::new(build_schema(PostFeed::new()));
        let req = request(Method::GET, "/graphql", None, "");
        let params = GraphQLParams {
            query: Some("{ __typename }".into()),
            ..Default::default()
        };

        assert!(engine.classify(&req, &params).is_none());
        assert!(matches!(
            engine.classify(&req, &GraphQLParams::default()),
            Some(ExecutionOutcome::Single(_))
        ));
    }

    #[tokio::test]
    async fn multipart_clients_get_the_result_as_one_part() {
        let engine = SchemaEngine::new(build_schema(PostFeed::new()));
        let req = request(Method::POST, "/graphql", Some("multipart/mixed"), "");
        let params = GraphQLParams {
            query: Some("{ __typename }".into()),
            ..Default::default()
        };

        let ExecutionOutcome::Streaming(chunks) = engine.execute(&req, params, context()).await
        else {
            panic!("expected a streaming response");
        };
        assert_eq!(
            chunks.collect::<Vec<_>>().await,
            vec![json!({ "data": { "__typename": "Query" } })]
        );
    }
}
