use std::fmt;

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

const BEARER_PREFIX: &str = "Bearer ";

/// Where the caller's token comes from.
///
/// HTTP requests hand over their headers; persistent connections hand over the
/// raw token they received in the handshake parameters.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Headers(&'a HeaderMap),
    RawToken(&'a str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token payload has no subject")]
    MalformedPayload,
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Subject of a token whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerifiedIdentity(String);

impl VerifiedIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Only `sub` matters here; everything else in the payload is ignored.
#[derive(Debug, Deserialize)]
struct TokenPayload {
    #[serde(default)]
    sub: Option<serde_json::Value>,
}

/// HS256 bearer-token verifier.
///
/// The secret is fixed for the lifetime of the resolver.
#[derive(Clone)]
pub struct IdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("IdentityResolver")
            .field("validation", &self.validation)
            .finish()
    }
}

impl IdentityResolver {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp/nbf are still checked when the token carries them
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Resolve a credential into the subject of a verified token.
    ///
    /// `None` means the caller had no credential at all.
    pub fn resolve(&self, credential: Option<Credential<'_>>) -> Result<VerifiedIdentity, AuthError> {
        let token = match credential {
            Some(Credential::Headers(headers)) => bearer_token(headers)?,
            Some(Credential::RawToken(token)) => token,
            None => return Err(AuthError::NotAuthenticated),
        };

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = jsonwebtoken::decode::<TokenPayload>(token, &self.decoding_key, &self.validation)
            .map_err(|err| {
                tracing::warn!(error = %err, "bearer token verification failed");
                AuthError::InvalidToken
            })?;

        subject(data.claims.sub).ok_or_else(|| {
            tracing::warn!("verified token carries no usable subject");
            AuthError::MalformedPayload
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NotAuthenticated)?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) => Ok(token),
        None => {
            tracing::debug!("authorization header without bearer scheme, using it verbatim");
            Ok(value)
        }
    }
}

fn subject(sub: Option<serde_json::Value>) -> Option<VerifiedIdentity> {
    match sub? {
        serde_json::Value::String(s) if !s.is_empty() => Some(VerifiedIdentity(s)),
        serde_json::Value::Number(n) => Some(VerifiedIdentity(n.to_string())),
        _ => None,
    }
}
