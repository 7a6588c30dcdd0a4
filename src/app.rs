/*
 * Responsibility
 * - Config loading -> dependency wiring -> Router assembly
 * - Middleware application (CORS / request-id / tracing)
 * - Two listeners: /graphql on PORT, the event socket on EVENTS_PORT
 * - Ctrl-C: close persistent sockets and wait for them, then drain both listeners
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::graphql::{ExecutionEngine, PostFeed, SchemaEngine, build_schema};
use crate::middleware;
use crate::shutdown::Shutdown;
use crate::state::AppState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,graphql_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash so it gets noticed. Production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Arc::new(Config::from_env()?);
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(?config, "starting gateway in {:?} mode", config.app_env);

    let shutdown = Shutdown::new();
    let state = build_state(config.clone(), shutdown.clone())?;

    let graphql_listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    let events_listener = TcpListener::bind(config.events_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.events_addr))?;

    tracing::info!("graphql listening on {}", config.addr);
    tracing::info!("event socket listening on {}", config.events_addr);

    let mut graphql_task = spawn_server(
        graphql_listener,
        build_router(state.clone(), &config),
        shutdown.clone(),
    );
    let mut events_task = spawn_server(events_listener, api::events::router(state), shutdown.clone());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("received ctrl-c, shutting down");
        }
        res = &mut graphql_task => {
            tracing::error!(?res, "graphql listener stopped unexpectedly");
        }
        res = &mut events_task => {
            tracing::error!(?res, "event socket listener stopped unexpectedly");
        }
    }

    // Persistent sockets go first; listeners only start draining once they are gone.
    tracing::info!(open = shutdown.open_sockets(), "closing persistent sockets");
    shutdown.trigger();
    if tokio::time::timeout(SHUTDOWN_GRACE, shutdown.sockets_closed())
        .await
        .is_err()
    {
        tracing::warn!(
            open = shutdown.open_sockets(),
            "sockets still open after {:?}",
            SHUTDOWN_GRACE
        );
    }
    shutdown.close_listeners();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        if !graphql_task.is_finished() {
            let _ = (&mut graphql_task).await;
        }
        if !events_task.is_finished() {
            let _ = (&mut events_task).await;
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("listeners did not drain within {:?}", SHUTDOWN_GRACE);
        graphql_task.abort();
        events_task.abort();
    }

    tracing::info!("gateway stopped");
    Ok(())
}

fn build_state(config: Arc<Config>, shutdown: Shutdown) -> Result<AppState> {
    // Lazy: the process starts even if the database comes up later.
    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_lazy(&config.database_url)
        .context("invalid DATABASE_URL")?;

    let schema = build_schema(PostFeed::new());
    let engine: Arc<dyn ExecutionEngine> = Arc::new(SchemaEngine::new(schema.clone()));

    Ok(AppState::new(config, db, schema, engine, shutdown))
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = api::graphql::routes().with_state(state);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router)
}

fn spawn_server(
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.listeners_closed().await })
            .await
    })
}
