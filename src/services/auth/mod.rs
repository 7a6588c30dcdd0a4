pub mod identity;

pub use identity::{AuthError, Credential, IdentityResolver, VerifiedIdentity};
