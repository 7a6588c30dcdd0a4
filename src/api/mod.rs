/*
 * Responsibility
 * - Transport surfaces: /graphql (HTTP + WebSocket), health, event socket
 */
pub mod events;
pub mod graphql;
mod health;
