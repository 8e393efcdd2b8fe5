/// Lifecycle of one workload/sampler pair.
///
/// `Idle -> Launching -> Running -> Stopping -> Terminated`. Launch failures
/// go straight to `Terminated`, killing the workload if it was already up.
/// Once `Running`, either the watcher (workload finished) or the signal
/// bridge sets the shared stop flag; the orchestrator then joins the watcher
/// and force-kills whatever is still alive.
use crate::config::Settings;
use crate::launcher::{self, LaunchError, ThreadIdList};
use crate::shutdown::ShutdownCoordinator;
use crate::signals::{SignalBridge, SignalError};
use crate::watcher::ProcessWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Launching,
    Running,
    Stopping,
    Terminated,
}

/// What a completed run had to clean up.
#[derive(Debug, Default)]
pub struct RunReport {
    pub thread_ids: ThreadIdList,
    /// The workload was still running at shutdown and had to be killed.
    pub workload_terminated: bool,
    /// The sampler was still running at shutdown and had to be killed.
    pub sampler_terminated: bool,
}

/// Errors that abort a run before it reaches `Running`.
#[derive(Debug)]
pub enum RunError {
    Launch(LaunchError),
    Signals(SignalError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Launch(e) => write!(f, "{e}"),
            RunError::Signals(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Launch(e) => Some(e),
            RunError::Signals(e) => Some(e),
        }
    }
}

impl From<LaunchError> for RunError {
    fn from(e: LaunchError) -> Self {
        RunError::Launch(e)
    }
}

impl From<SignalError> for RunError {
    fn from(e: SignalError) -> Self {
        RunError::Signals(e)
    }
}

pub struct Orchestrator {
    settings: Settings,
    coordinator: ShutdownCoordinator,
    state: State,
}

impl Orchestrator {
    pub fn new(settings: Settings, coordinator: ShutdownCoordinator) -> Self {
        Self {
            settings,
            coordinator,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, next: State) {
        tracing::debug!(from = ?self.state, to = ?next, "orchestrator state change");
        self.state = next;
    }

    /// Launch both processes, supervise until stop, then clean up.
    ///
    /// `Terminated` is absorbing: running an orchestrator a second time does
    /// nothing and returns an empty report.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        if self.state != State::Idle {
            tracing::warn!(state = ?self.state, "orchestrator already ran, ignoring");
            return Ok(RunReport::default());
        }

        self.transition(State::Launching);

        // Listening from the start means a signal during launch cancels the
        // launch instead of killing the coordinator.
        let bridge = if self.settings.handle_signals {
            match SignalBridge::install(self.coordinator.clone()) {
                Ok(bridge) => Some(bridge),
                Err(e) => {
                    self.transition(State::Terminated);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let result = self.supervise().await;

        if let Some(bridge) = bridge {
            bridge.uninstall();
        }
        self.transition(State::Terminated);
        result
    }

    async fn supervise(&mut self) -> Result<RunReport, RunError> {
        let settings = &self.settings;

        let mut workload = launcher::launch_workload(
            &settings.workload_path(),
            settings.order,
            settings.threads,
        )?;

        let read = tokio::select! {
            read = launcher::read_thread_ids(&mut workload) => Some(read),
            () = self.coordinator.stopped() => None,
        };
        let thread_ids = match read {
            Some(Ok(ids)) => ids,
            Some(Err(e)) => {
                workload.terminate().await;
                return Err(e.into());
            }
            None => {
                tracing::info!("stop requested before workload reported thread ids");
                let workload_terminated = workload.terminate().await;
                return Ok(RunReport {
                    workload_terminated,
                    ..RunReport::default()
                });
            }
        };

        let mut sampler = match launcher::launch_sampler(
            &settings.sampler_path(),
            &thread_ids,
            &settings.cpu_file,
            &settings.pid_file,
            settings.interval_ms,
        ) {
            Ok(sampler) => sampler,
            Err(e) => {
                workload.terminate().await;
                return Err(e.into());
            }
        };

        let watcher = ProcessWatcher::new(self.coordinator.clone(), settings.poll_interval)
            .spawn(vec![workload]);

        self.transition(State::Running);
        let coordinator = self.coordinator.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || coordinator.wait_until_stopped()).await
        {
            tracing::error!(error = %e, "shutdown wait failed, stopping anyway");
            self.coordinator.signal_stop();
        }

        self.transition(State::Stopping);
        let survivors = match watcher.await {
            Ok(survivors) => survivors,
            Err(e) => {
                // The workload handle went down with the task; kill_on_drop
                // has already taken care of it.
                tracing::error!(error = %e, "process watcher failed");
                Vec::new()
            }
        };

        let mut workload_terminated = false;
        for mut process in survivors {
            workload_terminated |= process.terminate().await;
        }
        let sampler_terminated = sampler.terminate().await;

        tracing::info!(
            workload_terminated,
            sampler_terminated,
            "all managed processes stopped"
        );
        Ok(RunReport {
            thread_ids,
            workload_terminated,
            sampler_terminated,
        })
    }
}
