//! Bearer token shared between the REST client and the push channel.

use std::sync::{Arc, RwLock};

/// Shared, refreshable bearer token.
///
/// The token is read from the [`RwLock`] on every outgoing request, so
/// signing in or out takes effect without rebuilding the HTTP client. If the
/// token string is empty, no `Authorization` header is added.
///
/// # Panics
///
/// Methods panic if the inner [`RwLock`] is poisoned (a writer panicked
/// while holding the lock). This is treated as an invariant violation.
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    /// Shared token string. An empty string means "no auth".
    pub(crate) token: Arc<RwLock<String>>,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.into())),
        }
    }

    /// Replace the token in place. Every clone observes the new value.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().expect("token RwLock poisoned") = token.into();
    }

    pub fn clear(&self) {
        self.token.write().expect("token RwLock poisoned").clear();
    }

    /// A copy of the current token; empty when signed out.
    pub fn current(&self) -> String {
        self.token.read().expect("token RwLock poisoned").clone()
    }

    /// Attach `Authorization: Bearer <token>` to a request, unless the token
    /// is empty.
    pub(crate) fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.token.read().expect("token RwLock poisoned");
        if token.is_empty() {
            req
        } else {
            req.bearer_auth(token.as_str())
        }
    }
}
