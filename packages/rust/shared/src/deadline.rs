//! Request-scoped deadline and cancellation.
//!
//! Every classification request owns exactly one root [`Deadline`]. Stages
//! derive children with [`Deadline::child`], which can only ever *shorten*
//! the time left and share the parent's cancellation token, so cancelling
//! the request reaches every in-flight fetch.
//!
//! Stages must call [`Deadline::is_expired`] before starting work. Relying
//! on an inherited token alone makes a child fail instantly with a
//! cancellation instead of skipping the attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a deadline-bound future did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    /// The wall-clock deadline passed.
    #[error("deadline expired")]
    Expired,
    /// The owning request (or a parent stage) was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// A point in time plus the cancellation token that goes with it.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// A fresh root deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self::at(Instant::now() + budget)
    }

    /// A fresh root deadline at an absolute instant.
    pub fn at(at: Instant) -> Self {
        Self {
            at,
            token: CancellationToken::new(),
        }
    }

    /// A root deadline bound to a caller-owned cancellation token.
    pub fn with_token(at: Instant, token: CancellationToken) -> Self {
        Self { at, token }
    }

    /// Derive a child deadline: never later than the parent, cancelled with it.
    pub fn child(&self, budget: Duration) -> Self {
        let candidate = Instant::now() + budget;
        Self {
            at: candidate.min(self.at),
            token: self.token.child_token(),
        }
    }

    /// The absolute instant this deadline expires at.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// The cancellation token observed by work under this deadline.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// `true` once the deadline passed or the token was cancelled.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.remaining().is_zero()
    }

    /// Cancel this deadline and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves when the deadline passes or the token is cancelled.
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.at) => {}
        }
    }

    /// Drive `fut` to completion unless the deadline expires first.
    ///
    /// Checks expiry *before* polling `fut`, so an already-dead deadline
    /// never starts the work at all.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if self.remaining().is_zero() {
            return Err(Interrupted::Expired);
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep_until(self.at) => Err(Interrupted::Expired),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_never_outlives_parent() {
        let parent = Deadline::after(Duration::from_millis(50));
        let child = parent.child(Duration::from_secs(60));
        assert!(child.instant() <= parent.instant());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Deadline::after(Duration::from_secs(5));
        let child = parent.child(Duration::from_secs(5));
        parent.cancel();
        assert!(child.is_expired());
        assert_eq!(child.run(async { 1 }).await, Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn expired_deadline_never_polls_future() {
        let deadline = Deadline::at(Instant::now());
        let polled = std::sync::atomic::AtomicBool::new(false);
        let out = deadline
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
            })
            .await;
        assert_eq!(out, Err(Interrupted::Expired));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_times_out_slow_work() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let out = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupted::Expired));
    }

    #[tokio::test]
    async fn run_returns_output_in_time() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(deadline.run(async { 42 }).await, Ok(42));
    }
}
