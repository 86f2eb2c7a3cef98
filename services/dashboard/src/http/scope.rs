//! services/dashboard/src/http/scope.rs
//!
//! Ties a group of requests to the lifetime of whatever issued them.

use tokio_util::sync::{CancellationToken, DropGuard};

/// Dropping the scope cancels every request started with its token.
pub struct RequestScope {
    token: CancellationToken,
    _guard: DropGuard,
}

impl RequestScope {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        Self {
            _guard: token.clone().drop_guard(),
            token,
        }
    }

    /// A token to attach to a request; cancelled when the scope goes away.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_the_scope_cancels_issued_tokens() {
        let scope = RequestScope::new();
        let first = scope.token();
        let second = scope.token();
        assert!(!first.is_cancelled());
        drop(scope);
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[test]
    fn explicit_cancel() {
        let scope = RequestScope::new();
        let token = scope.token();
        scope.cancel();
        assert!(scope.is_cancelled());
        assert!(token.is_cancelled());
    }
}
