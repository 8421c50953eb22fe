//! API key authentication for the message routes.

use crate::{config::SecurityConfig, errors::ApiError};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Name of the client that presented a valid key, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedClient(pub String);

/// Checks a request header against a fixed set of API keys
#[derive(Debug, Clone)]
pub struct ApiKeyAuthenticator {
    header: String,
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    /// Create an authenticator from `client name -> key` pairs
    pub fn new(header: impl Into<String>, keys: HashMap<String, String>) -> Self {
        Self {
            header: header.into(),
            keys,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.api_key_header.clone(), config.api_keys.clone())
    }

    /// True when no keys are configured and every request is let through
    pub fn is_disabled(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// Resolve a presented token to the client it belongs to
    pub fn authenticate(&self, token: &str) -> Option<&str> {
        if token.is_empty() {
            return None;
        }

        // No early exit: every configured key is compared
        let mut matched = None;
        for (client, key) in &self.keys {
            if bool::from(token.as_bytes().ct_eq(key.as_bytes())) {
                matched = Some(client.as_str());
            }
        }
        matched
    }
}

/// Middleware rejecting requests without a valid API key
///
/// CORS preflight requests pass through untouched.
pub async fn require_api_key(
    State(auth): State<Arc<ApiKeyAuthenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.is_disabled() || request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(auth.header_name())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match auth.authenticate(token) {
        Some(client) => {
            debug!(client = %client, "Request authenticated");
            let client = AuthenticatedClient(client.to_string());
            request.extensions_mut().insert(client);
            Ok(next.run(request).await)
        }
        None => {
            warn!(
                uri = %request.uri(),
                header_present = !token.is_empty(),
                "API key rejected"
            );
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
