use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A cancellable delayed action.
///
/// The action runs after `delay` unless `cancel()` was called first. The
/// cancellation flag is checked cooperatively after the sleep, so a cancel
/// racing the deadline is still honored before the action fires.
pub struct DelayedTask {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl DelayedTask {
    pub fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                action.await;
            }
        });

        Self { handle, cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
