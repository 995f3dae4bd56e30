//! Per-request authorization context
//!
//! An [`AuthContext`] travels by value through the resolver and the rule
//! set. It carries the cancellation token for the connection and a small
//! string map that those collaborators can annotate.

use crate::socks::auth::AuthMethod;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Key under which the authenticated username is stored
pub const CTX_USERNAME: &str = "username";

/// Key under which rule sets record the deciding rule
pub const CTX_RULE: &str = "rule";

/// Key under which the resolver records the name it resolved
pub const CTX_RESOLVED: &str = "resolved";

/// Request-scoped context passed through `Resolver` and `RuleSet` calls
#[derive(Debug, Clone)]
pub struct AuthContext {
    method: AuthMethod,
    cancel: CancellationToken,
    payload: HashMap<String, String>,
}

impl AuthContext {
    /// Create a context for a connection authenticated with `method`
    pub fn new(method: AuthMethod) -> Self {
        AuthContext {
            method,
            cancel: CancellationToken::new(),
            payload: HashMap::new(),
        }
    }

    /// Create a context whose cancellation follows `parent`
    pub fn with_parent(method: AuthMethod, parent: &CancellationToken) -> Self {
        AuthContext {
            method,
            cancel: parent.child_token(),
            payload: HashMap::new(),
        }
    }

    /// Authentication method negotiated for this connection
    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// Return the context with `key` set to `value`
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Look up an annotation
    pub fn value(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    /// Cancel every blocking call tied to this context
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        AuthContext::new(AuthMethod::None)
    }
}
