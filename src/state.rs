/*
 * Responsibility
 * - Shared context attached to the Routers (AppState)
 * - Cheap to Clone (everything inside is Arc/Clone cheap), read-only after start
 */
use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::graphql::{AppSchema, ExecutionEngine};
use crate::services::auth::IdentityResolver;
use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub schema: AppSchema,
    pub engine: Arc<dyn ExecutionEngine>,
    pub identity: Arc<IdentityResolver>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: PgPool,
        schema: AppSchema,
        engine: Arc<dyn ExecutionEngine>,
        shutdown: Shutdown,
    ) -> Self {
        let identity = Arc::new(IdentityResolver::new(config.auth_secret.as_bytes()));
        Self {
            config,
            db,
            schema,
            engine,
            identity,
            shutdown,
        }
    }
}
