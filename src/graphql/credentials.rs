//! Per-operation rejection for persistent connections whose handshake
//! credential did not verify.
//!
//! The connection itself stays open. Every operation started on it fails with
//! the resolver's error (extension code `UNAUTHENTICATED`) before parsing.

use std::sync::Arc;

use async_graphql::{
    ErrorExtensions, Pos, Request, ServerResult,
    extensions::{Extension, ExtensionContext, ExtensionFactory, NextPrepareRequest},
};

use crate::services::auth::AuthError;

/// Connection data marker: the handshake credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCredential(pub AuthError);

pub struct CredentialCheck;

impl ExtensionFactory for CredentialCheck {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(CredentialCheckExtension)
    }
}

struct CredentialCheckExtension;

#[async_trait::async_trait]
impl Extension for CredentialCheckExtension {
    async fn prepare_request(
        &self,
        ctx: &ExtensionContext<'_>,
        request: Request,
        next: NextPrepareRequest<'_>,
    ) -> ServerResult<Request> {
        if let Some(RejectedCredential(err)) = ctx.data_opt::<RejectedCredential>() {
            tracing::debug!(error = %err, "operation refused on rejected connection");
            return Err(err.extend().into_server_error(Pos::default()));
        }
        next.run(ctx, request).await
    }
}
