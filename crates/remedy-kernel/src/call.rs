//! Call guard
//!
//! Wraps every connector call with a deadline and an optional cancellation
//! signal. A call that times out or is cancelled is abandoned; the engine
//! turns that into a FAILED result rather than an error.

use crate::types::{ExecutionResult, FailureKind};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Per-call limits supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for the whole call; `None` uses the engine default
    pub timeout: Option<Duration>,
    /// Fires when the value becomes `true`
    pub cancel: Option<watch::Receiver<bool>>,
}

impl CallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Fill in the timeout if the caller left it unset
    #[must_use]
    pub fn or_timeout(mut self, default: Duration) -> Self {
        self.timeout.get_or_insert(default);
        self
    }
}

/// Caller-side handle that cancels every call holding its receiver
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and the receiver to pass in [`CallOptions`]
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Why a guarded call did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CallAbort {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl CallAbort {
    #[must_use]
    pub fn failure_kind(self) -> FailureKind {
        match self {
            CallAbort::Timeout(_) => FailureKind::Timeout,
            CallAbort::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Express the abort as a FAILED execution result
    #[must_use]
    pub fn into_result(self, what: &str) -> ExecutionResult {
        ExecutionResult::failed(self.failure_kind(), format!("{what} {self}"))
    }
}

async fn cancelled(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling; never fires
            return std::future::pending().await;
        }
    }
}

/// Run `fut` under the limits in `options`
///
/// # Errors
/// Returns [`CallAbort`] if the deadline passes or the cancel signal fires
/// first. The future is dropped in that case.
pub async fn guarded<F, T>(options: &CallOptions, fut: F) -> Result<T, CallAbort>
where
    F: Future<Output = T>,
{
    let deadline = async {
        match options.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancelled(options.cancel.clone()) => Err(CallAbort::Cancelled),
        value = fut => Ok(value),
        () = deadline => Err(CallAbort::Timeout(options.timeout.unwrap_or_default())),
    }
}

/// [`guarded`] for calls that already report failure as data
pub async fn guarded_execution<F>(options: &CallOptions, what: &str, fut: F) -> ExecutionResult
where
    F: Future<Output = ExecutionResult>,
{
    match guarded(options, fut).await {
        Ok(result) => result,
        Err(abort) => {
            tracing::warn!("{} aborted: {}", what, abort);
            abort.into_result(what)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let options = CallOptions::new().with_timeout(Duration::from_secs(1));
        assert_eq!(guarded(&options, async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn times_out() {
        let options = CallOptions::new().with_timeout(Duration::from_millis(50));
        let result = guarded(&options, tokio::time::sleep(Duration::from_secs(10))).await;
        assert_eq!(result, Err(CallAbort::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn cancel_before_start() {
        let (handle, rx) = CancelHandle::new();
        handle.cancel();
        let options = CallOptions::new().with_cancel(rx);
        let result = guarded_execution(&options, "restart", async {
            ExecutionResult::success("ran")
        })
        .await;
        assert_eq!(result.failure, Some(FailureKind::Cancelled));
    }

    #[tokio::test]
    async fn cancel_while_running() {
        let (handle, rx) = CancelHandle::new();
        let options = CallOptions::new().with_cancel(rx);

        let task = tokio::spawn(async move {
            guarded(&options, tokio::time::sleep(Duration::from_secs(30))).await
        });
        tokio::task::yield_now().await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(CallAbort::Cancelled));
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (handle, rx) = CancelHandle::new();
        drop(handle);
        let options = CallOptions::new().with_cancel(rx);
        assert_eq!(guarded(&options, async { "done" }).await, Ok("done"));
    }

    #[test]
    fn default_timeout_fills_only_when_unset() {
        let options = CallOptions::new().or_timeout(Duration::from_secs(5));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        let options = CallOptions::new()
            .with_timeout(Duration::from_secs(1))
            .or_timeout(Duration::from_secs(5));
        assert_eq!(options.timeout, Some(Duration::from_secs(1)));
    }
}
