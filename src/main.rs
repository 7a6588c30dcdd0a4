/*
 * Responsibility
 * - tokio runtime startup
 * - Calls app::run() (no logic here)
 */
use anyhow::Result;

mod api;
mod app;
mod config;
mod error;
mod graphql;
mod middleware;
mod repos;
mod services;
mod shutdown;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
