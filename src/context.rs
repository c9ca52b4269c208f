//! Caller-supplied deadline and cancellation for [`Manager::acquire`](crate::manager::Manager::acquire).
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries an optional deadline and a cancellation signal into an acquisition.
///
/// Acquisition honours both while polling the free queue and while dialing a new connection.
/// When either fires, the acquisition fails with the matching [`ContextError`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

/// Why a [`Context`] is done.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Context {
    /// A context that never expires and is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Expire `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Expire at `deadline`.
    ///
    /// An earlier deadline already set on the context is kept.
    #[must_use]
    pub fn with_deadline(self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    /// Cancel the context when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        Self {
            cancellation: token,
            ..self
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason the context is done, if it is.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancellation.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancellation.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.cancellation.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}
