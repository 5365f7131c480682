//! Cancellable deferred flush.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A scheduled flight-time flush.
///
/// The timer runs as a task on the current runtime. Awaiting [`fired`]
/// resolves to `true` when the delay elapsed and `false` when cancelled.
///
/// [`fired`]: DeferredFlush::fired
#[derive(Debug)]
pub struct DeferredFlush {
    token: CancellationToken,
    handle: JoinHandle<bool>,
}

impl DeferredFlush {
    /// Start the timer.
    pub fn schedule(delay: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => false,
                () = tokio::time::sleep(delay) => true,
            }
        });
        Self { token, handle }
    }

    /// Stop the timer; the flush will not run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the timer to finish.
    pub async fn fired(&mut self) -> bool {
        (&mut self.handle).await.unwrap_or(false)
    }
}

impl Drop for DeferredFlush {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let mut flush = DeferredFlush::schedule(Duration::from_secs(200));
        assert!(flush.fired().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let mut flush = DeferredFlush::schedule(Duration::from_secs(200));
        flush.cancel();
        assert!(!flush.fired().await);
    }
}
