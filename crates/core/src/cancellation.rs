//! Cooperative cancellation for running operations
//!
//! A [`CancellationToken`] is handed to the build tool before any blocking
//! work starts. The tool polls [`CancellationToken::is_cancelled`] between
//! steps or awaits [`CancellationToken::cancelled`] alongside its own I/O.
//! Nothing is ever forcibly aborted by the token itself.

use std::fmt;

/// One-shot cancellation signal owned by a single operation.
///
/// Clones observe the same signal. Once signalled, a token never returns to
/// the active state; tokens are never reused across operations.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// Create a fresh, active token
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent and safe to call from any thread.
    pub fn signal(&self) {
        self.inner.cancel();
    }

    /// Non-blocking observation of the signal
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Wait until the token is signalled. Returns immediately if it already is.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_signal_is_idempotent_and_irreversible() {
        let token = CancellationToken::new();
        token.signal();
        token.signal();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_tokens_are_independent() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        a.signal();
        assert!(!b.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.signal();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_signalled() {
        let token = CancellationToken::new();
        token.signal();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already signalled");
    }
}
