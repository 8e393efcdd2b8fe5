/// Background liveness poller for managed processes.
///
/// Owns its watch list outright: entries are dropped the first time they are
/// seen finished and never come back. When the list runs empty the watcher
/// requests shutdown itself, mirroring the signal path.
use crate::process::ManagedProcess;
use crate::shutdown::ShutdownCoordinator;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Processes the watcher still considers live, in launch order.
pub type WatchList = Vec<ManagedProcess>;

pub struct ProcessWatcher {
    coordinator: ShutdownCoordinator,
    poll_interval: Duration,
}

impl ProcessWatcher {
    pub fn new(coordinator: ShutdownCoordinator, poll_interval: Duration) -> Self {
        Self {
            coordinator,
            poll_interval,
        }
    }

    /// Run the watcher as its own task. Joining the handle yields whatever
    /// was still alive when the watcher stopped.
    pub fn spawn(self, list: WatchList) -> JoinHandle<WatchList> {
        tokio::spawn(self.run(list))
    }

    pub async fn run(self, mut list: WatchList) -> WatchList {
        while !list.is_empty() {
            if self.coordinator.is_stopped() {
                tracing::debug!(remaining = list.len(), "watcher observed stop request");
                return list;
            }

            list.retain_mut(|process| process.is_alive());

            if !list.is_empty() {
                tracing::trace!(remaining = list.len(), "watched processes still running");
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        tracing::info!("all watched processes finished, requesting shutdown");
        self.coordinator.signal_stop();
        list
    }
}
