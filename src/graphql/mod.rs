pub mod context;
pub mod credentials;
pub mod engine;
pub mod feed;
pub mod schema;

pub use context::{RequestContext, Transport};
pub use credentials::RejectedCredential;
pub use engine::{ExecutionEngine, ExecutionOutcome, GraphQLHttpRequest, GraphQLParams, SchemaEngine};
pub use feed::PostFeed;
pub use schema::{AppSchema, build_schema};
