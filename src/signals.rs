/// Signal handling for shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both request the same orderly stop. The
/// OS-level handler is tokio's, which only records delivery; the bridge task
/// then sets the shared stop flag from ordinary task context. Repeated
/// signals of either kind are harmless because the flag is monotonic.
use crate::shutdown::ShutdownCoordinator;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Failure to register the OS signal listeners.
#[derive(Debug)]
pub struct SignalError {
    source: std::io::Error,
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to install signal handlers: {}", self.source)
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Forwards SIGINT/SIGTERM into a [`ShutdownCoordinator`].
#[derive(Debug)]
pub struct SignalBridge {
    task: JoinHandle<()>,
}

impl SignalBridge {
    /// Register listeners for SIGINT and SIGTERM and start forwarding them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(coordinator: ShutdownCoordinator) -> Result<SignalBridge, SignalError> {
        let mut interrupt =
            signal(SignalKind::interrupt()).map_err(|e| SignalError { source: e })?;
        let mut terminate =
            signal(SignalKind::terminate()).map_err(|e| SignalError { source: e })?;

        let task = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    else => break,
                };
                coordinator.signal_stop();
                tracing::info!(signal = name, "received termination signal, shutting down");
            }
        });

        tracing::debug!("signal bridge installed for SIGINT and SIGTERM");
        Ok(SignalBridge { task })
    }

    /// Stop forwarding signals.
    pub fn uninstall(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SIGNAL_TEST_LOCK;
    use nix::sys::signal::{raise, Signal};
    use std::time::Duration;

    async fn wait_for_stop(coordinator: &ShutdownCoordinator) -> bool {
        for _ in 0..100 {
            if coordinator.is_stopped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        coordinator.is_stopped()
    }

    #[test]
    fn test_signal_error_display() {
        let err = SignalError {
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        assert!(err.to_string().contains("failed to install signal handlers"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_repeated_signals_set_flag_once() {
        let _serial = SIGNAL_TEST_LOCK.lock().await;
        let coordinator = ShutdownCoordinator::new();
        let bridge = SignalBridge::install(coordinator.clone()).unwrap();
        assert!(!coordinator.is_stopped());

        raise(Signal::SIGINT).unwrap();
        raise(Signal::SIGINT).unwrap();
        assert!(wait_for_stop(&coordinator).await);

        raise(Signal::SIGTERM).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(coordinator.is_stopped());

        bridge.uninstall();
    }
}
