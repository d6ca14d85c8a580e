use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A single-shot, cancellable empty-room timer (C7, spec §4.7). `update(0)`
/// arms the timer; any `update(n)` with `n > 0` before it fires cancels it.
/// The handler registered at construction runs at most once.
pub struct CallEndDetector {
    empty_timeout: Duration,
    handler: Arc<dyn Fn() + Send + Sync>,
    armed: Mutex<Option<ArmedTimer>>,
}

struct ArmedTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CallEndDetector {
    pub fn new(empty_timeout: Duration, handler: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            empty_timeout,
            handler: Arc::new(handler),
            armed: Mutex::new(None),
        }
    }

    /// Report the current non-worker participant count.
    pub async fn update(&self, count: usize) {
        let mut armed = self.armed.lock().await;

        if count == 0 {
            if armed.is_some() {
                return;
            }
            let cancel = CancellationToken::new();
            let handler = Arc::clone(&self.handler);
            let timeout = self.empty_timeout;
            let cancel_for_task = cancel.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        handler();
                    }
                }
            });
            *armed = Some(ArmedTimer { cancel, handle });
        } else if let Some(timer) = armed.take() {
            timer.cancel.cancel();
        }
    }

    /// Cancel any pending timer and fire the handler immediately.
    pub async fn force(&self) {
        let mut armed = self.armed.lock().await;
        if let Some(timer) = armed.take() {
            timer.cancel.cancel();
            let _ = timer.handle.await;
        }
        (self.handler)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout_when_still_empty() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let detector = CallEndDetector::new(Duration::from_millis(100), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        detector.update(0).await;
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_by_nonzero_update_before_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let detector = CallEndDetector::new(Duration::from_millis(100), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        detector.update(0).await;
        tokio::time::advance(Duration::from_millis(50)).await;
        detector.update(1).await;
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn force_fires_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let detector = CallEndDetector::new(Duration::from_secs(60), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        detector.force().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
