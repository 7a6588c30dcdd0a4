pub mod handler;
pub mod multipart;
mod routes;
mod websocket;

pub use routes::routes;
