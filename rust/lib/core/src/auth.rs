//! Authentication seam.
//!
//! The site layer does not know where users come from. An
//! [`Authenticator`] turns request headers into an [`Identity`]; the
//! binary installs one at startup and the context factory copies the
//! identity's roles onto each request context.

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// The authenticated caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// IANA time zone preferred by this user.
    #[serde(default)]
    pub time_location: Option<String>,
}

/// Pluggable authenticator.
pub trait Authenticator: Send + Sync + 'static {
    /// Resolve the caller. `Ok(None)` means anonymous.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>, ServiceError>;
}

/// Treats every request as anonymous.
pub struct Anonymous;

impl Authenticator for Anonymous {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<Option<Identity>, ServiceError> {
        Ok(None)
    }
}

/// Static bearer tokens, typically loaded from the server config.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Identity>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>, ServiceError> {
        let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|_| ServiceError::Unauthorized("malformed authorization header".into()))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected a bearer token".into()))?;
        self.tokens
            .get(token)
            .cloned()
            .map(Some)
            .ok_or_else(|| ServiceError::Unauthorized("unknown token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_tokens_resolve_identity() {
        let mut auth = StaticTokens::new();
        auth.insert(
            "t0k3n",
            Identity {
                id: "u1".into(),
                name: "Alice".into(),
                roles: vec!["admin".into()],
                time_location: None,
            },
        );

        let mut headers = HeaderMap::new();
        assert_eq!(auth.authenticate(&headers).unwrap(), None);

        headers.insert("authorization", "Bearer t0k3n".parse().unwrap());
        let who = auth.authenticate(&headers).unwrap().unwrap();
        assert_eq!(who.roles, vec!["admin".to_string()]);

        headers.insert("authorization", "Bearer nope".parse().unwrap());
        assert!(matches!(auth.authenticate(&headers), Err(ServiceError::Unauthorized(_))));
    }
}
