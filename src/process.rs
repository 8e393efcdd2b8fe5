/// Handle to a started external process.
///
/// Every managed child is spawned as the leader of its own process group, so
/// forced termination signals the whole group and then reaps the child.
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout};

#[derive(Debug)]
pub struct ManagedProcess {
    name: String,
    pid: u32,
    child: Child,
    /// Captured stdout, kept open for the lifetime of the process so the
    /// child never writes into a closed pipe.
    stdout: Option<BufReader<ChildStdout>>,
    exit_status: Option<ExitStatus>,
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>, mut child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        let stdout = child.stdout.take().map(BufReader::new);
        Self {
            name: name.into(),
            pid,
            child,
            stdout,
            exit_status: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(test)]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub(crate) fn stdout_mut(&mut self) -> Option<&mut BufReader<ChildStdout>> {
        self.stdout.as_mut()
    }

    /// Non-blocking liveness check.
    ///
    /// The exit status is recorded and logged but never interpreted: a crash
    /// and a clean exit both just mean "finished". A failed check also counts
    /// as finished.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::info!(
                    process = %self.name,
                    pid = self.pid,
                    exit_code = ?status.code(),
                    "process exited"
                );
                self.exit_status = Some(status);
                false
            }
            Err(e) => {
                tracing::warn!(
                    process = %self.name,
                    pid = self.pid,
                    error = %e,
                    "liveness check failed, treating process as finished"
                );
                false
            }
        }
    }

    /// Kill the process group with SIGKILL if the process is still running,
    /// then reap it. Returns whether a kill was needed.
    pub async fn terminate(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }

        let group_killed = self.pid != 0
            && match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        process = %self.name,
                        pid = self.pid,
                        error = %e,
                        "failed to kill process group, killing process directly"
                    );
                    false
                }
            };
        if !group_killed {
            if let Err(e) = self.child.start_kill() {
                tracing::warn!(process = %self.name, pid = self.pid, error = %e, "kill failed");
            }
        }

        match self.child.wait().await {
            Ok(status) => self.exit_status = Some(status),
            Err(e) => {
                tracing::warn!(process = %self.name, pid = self.pid, error = %e, "failed to reap process")
            }
        }
        tracing::info!(process = %self.name, pid = self.pid, "process force-terminated");
        true
    }
}
