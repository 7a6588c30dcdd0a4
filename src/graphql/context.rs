/*
 * Responsibility
 * - The typed execution context resolvers see (identity, db, request meta)
 * - Built from an HTTP request or from persistent-connection handshake params
 * - Nothing else from the raw request is visible to resolvers
 */
use async_graphql::ErrorExtensions;
use axum::http::{HeaderMap, Method, Uri, header};
use sqlx::PgPool;

use crate::services::auth::{AuthError, Credential, IdentityResolver, VerifiedIdentity};

/// Which listener the operation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
    EventSocket,
}

#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub transport: Transport,
    pub method: Option<Method>,
    pub uri: Option<Uri>,
    pub request_id: Option<String>,
}

impl RequestMeta {
    fn transport(transport: Transport) -> Self {
        Self {
            transport,
            method: None,
            uri: None,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// `None` for anonymous callers.
    pub identity: Option<VerifiedIdentity>,
    pub db: PgPool,
    pub request: RequestMeta,
}

impl RequestContext {
    /// Context for a plain HTTP request.
    ///
    /// The resolver only runs when an `Authorization` header is present;
    /// without one the caller is anonymous.
    pub fn from_http(
        resolver: &IdentityResolver,
        db: PgPool,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<Self, AuthError> {
        let identity = if headers.contains_key(header::AUTHORIZATION) {
            Some(resolver.resolve(Some(Credential::Headers(headers)))?)
        } else {
            None
        };

        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            identity,
            db,
            request: RequestMeta {
                transport: Transport::Http,
                method: Some(method.clone()),
                uri: Some(uri.clone()),
                request_id,
            },
        })
    }

    /// Context for a persistent connection, from its handshake parameters.
    ///
    /// `authToken` is the only field read. Absent or `null` means anonymous.
    pub fn from_connection_params(
        resolver: &IdentityResolver,
        db: PgPool,
        params: &serde_json::Value,
    ) -> Result<Self, AuthError> {
        let identity = match params.get("authToken") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(token)) => {
                Some(resolver.resolve(Some(Credential::RawToken(token)))?)
            }
            Some(_) => return Err(AuthError::InvalidToken),
        };

        Ok(Self {
            identity,
            db,
            request: RequestMeta::transport(Transport::WebSocket),
        })
    }

    pub fn anonymous(db: PgPool, transport: Transport) -> Self {
        Self {
            identity: None,
            db,
            request: RequestMeta::transport(transport),
        }
    }

    pub fn require_identity(&self) -> Result<&VerifiedIdentity, AuthError> {
        self.identity.as_ref().ok_or(AuthError::NotAuthenticated)
    }
}

impl ErrorExtensions for AuthError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, e| e.set("code", "UNAUTHENTICATED"))
    }
}
