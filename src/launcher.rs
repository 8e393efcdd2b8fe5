/// Starting the workload and sampler executables.
///
/// The workload runs with stdout and stderr captured; its first stdout line
/// lists the ids of the threads it spawned. The sampler is then started on
/// those ids with its stdout inherited so its own output stays visible.
use crate::process::ManagedProcess;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};

/// Thread identifiers reported by the workload, in the order printed.
pub type ThreadIdList = Vec<String>;

/// Errors that can occur while launching the managed processes.
#[derive(Debug)]
pub enum LaunchError {
    /// No executable at the expected path.
    ExecutableNotFound { path: PathBuf },
    /// The executable exists but could not be started.
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading the workload's thread-id line failed.
    ThreadIds { source: std::io::Error },
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::ExecutableNotFound { path } => {
                write!(f, "can not find executable {}", path.display())
            }
            LaunchError::Spawn { path, source } => {
                write!(f, "failed to start {}: {}", path.display(), source)
            }
            LaunchError::ThreadIds { source } => {
                write!(f, "failed to read thread ids from workload: {}", source)
            }
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::ExecutableNotFound { .. } => None,
            LaunchError::Spawn { source, .. } => Some(source),
            LaunchError::ThreadIds { source } => Some(source),
        }
    }
}

/// Start `<executable> <order> <threads>` with stdout and stderr captured.
pub fn launch_workload(
    executable: &Path,
    order: u32,
    threads: u32,
) -> Result<ManagedProcess, LaunchError> {
    let mut command = Command::new(executable);
    command
        .arg(order.to_string())
        .arg(threads.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = spawn(executable, &mut command)?;
    let process = ManagedProcess::new("workload", child);
    tracing::info!(
        path = %executable.display(),
        pid = process.pid(),
        order,
        threads,
        "workload started"
    );
    Ok(process)
}

/// Read the workload's first stdout line and split it into thread ids.
///
/// Blocks until the workload prints a full line or closes stdout. A closed
/// stream yields an empty list.
pub async fn read_thread_ids(process: &mut ManagedProcess) -> Result<ThreadIdList, LaunchError> {
    let Some(stdout) = process.stdout_mut() else {
        return Ok(ThreadIdList::new());
    };

    let mut line = Vec::new();
    stdout
        .read_until(b'\n', &mut line)
        .await
        .map_err(|e| LaunchError::ThreadIds { source: e })?;

    let ids = parse_thread_ids(&String::from_utf8_lossy(&line));
    tracing::info!(pid = process.pid(), thread_ids = ?ids, "workload reported thread ids");
    Ok(ids)
}

/// Start the sampler on `thread_ids`, inheriting stdout.
pub fn launch_sampler(
    executable: &Path,
    thread_ids: &[String],
    cpu_file: &str,
    pid_file: &str,
    interval_ms: u64,
) -> Result<ManagedProcess, LaunchError> {
    let args = sampler_args(thread_ids, cpu_file, pid_file, interval_ms);
    let mut command = Command::new(executable);
    command.args(&args).stdin(Stdio::null());

    let child = spawn(executable, &mut command)?;
    let process = ManagedProcess::new("sampler", child);
    tracing::info!(
        path = %executable.display(),
        pid = process.pid(),
        args = ?args,
        "sampler started"
    );
    Ok(process)
}

/// Trailing whitespace is dropped, then the line is split on single spaces.
/// Empty fields are skipped.
fn parse_thread_ids(line: &str) -> ThreadIdList {
    line.trim_end()
        .split(' ')
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// `--interval <ms> <id>... [--cpu-file <path>] [--pid-file <path>]`
fn sampler_args(
    thread_ids: &[String],
    cpu_file: &str,
    pid_file: &str,
    interval_ms: u64,
) -> Vec<String> {
    let mut args = vec!["--interval".to_string(), interval_ms.to_string()];
    args.extend(thread_ids.iter().cloned());
    if !cpu_file.is_empty() {
        args.push("--cpu-file".to_string());
        args.push(cpu_file.to_string());
    }
    if !pid_file.is_empty() {
        args.push("--pid-file".to_string());
        args.push(pid_file.to_string());
    }
    args
}

/// Spawn in a fresh process group so termination can take the whole group.
/// A handle dropped without `terminate()` still kills its direct child.
fn spawn(executable: &Path, command: &mut Command) -> Result<Child, LaunchError> {
    command
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LaunchError::ExecutableNotFound {
                path: executable.to_path_buf(),
            },
            _ => LaunchError::Spawn {
                path: executable.to_path_buf(),
                source: e,
            },
        })
}
