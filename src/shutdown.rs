/// Shared stop flag for the whole coordinator.
///
/// A single boolean behind one mutex and condition variable. The flag only
/// ever goes from `false` to `true`; every clone of the handle observes the
/// same state. Async callers can wait on the same flag through `stopped()`.
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: Mutex<bool>,
    cvar: Condvar,
    notify: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter. Calling it again is a no-op.
    pub fn signal_stop(&self) {
        let mut stopped = self.lock();
        if !*stopped {
            *stopped = true;
            self.inner.cvar.notify_all();
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Block the calling thread until the flag is set.
    ///
    /// The flag is re-checked on every wake, so spurious wakeups never
    /// return early and a stop that happened before the call returns
    /// immediately.
    pub fn wait_until_stopped(&self) {
        let guard = self.lock();
        let _guard = self
            .inner
            .cvar
            .wait_while(guard, |stopped| !*stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    /// Resolve once the flag is set, without blocking a runtime thread.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent stop cannot slip between.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    // A poisoned lock still holds a valid bool; keep going with it.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner
            .stopped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
