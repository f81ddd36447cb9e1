//! Cancellation and deadlines for long-running transfers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{PromoteError, Result};

/// A token that can be used to check if an operation has been cancelled
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the operation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the operation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Time budget for one operation, plus its cancellation token
#[derive(Clone, Debug)]
pub struct Deadline {
    expires_at: Option<Instant>,
    budget: Option<Duration>,
    token: CancellationToken,
}

impl Deadline {
    pub fn new(budget: Option<Duration>, token: CancellationToken) -> Self {
        Self {
            expires_at: budget.map(|b| Instant::now() + b),
            budget,
            token,
        }
    }

    /// No time limit and nobody can cancel
    pub fn unbounded() -> Self {
        Self::new(None, CancellationToken::new())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// True while transfers may keep going
    pub fn should_continue(&self) -> bool {
        !self.token.is_cancelled() && !self.is_expired()
    }

    /// Fail if cancelled or out of time
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(PromoteError::Cancelled);
        }
        if self.is_expired() {
            return Err(PromoteError::TimedOut(self.budget.unwrap_or_default()));
        }
        Ok(())
    }

    /// Replace a transport error with Cancelled/TimedOut when that was the cause
    pub fn explain(&self, error: PromoteError) -> PromoteError {
        match self.check() {
            Err(stop) => stop,
            Ok(()) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_unbounded_deadline_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(deadline.should_continue());
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = Deadline::new(Some(Duration::ZERO), CancellationToken::new());
        assert!(deadline.is_expired());
        assert!(matches!(deadline.check(), Err(PromoteError::TimedOut(_))));
    }

    #[test]
    fn test_cancel_wins_over_transport_error() {
        let token = CancellationToken::new();
        let deadline = Deadline::new(None, token.clone());
        token.cancel();

        let err = deadline.explain(PromoteError::Transport {
            url: "https://example.com".to_string(),
            message: "user cancelled".to_string(),
        });
        assert!(matches!(err, PromoteError::Cancelled));
    }

    #[test]
    fn test_explain_passes_through_when_running() {
        let deadline = Deadline::unbounded();
        let err = deadline.explain(PromoteError::Cancelled);
        assert!(matches!(err, PromoteError::Cancelled));
        let err = deadline.explain(PromoteError::AuthenticationRejected("x".into()));
        assert!(matches!(err, PromoteError::AuthenticationRejected(_)));
    }
}
