mod config;
mod launcher;
mod orchestrator;
mod process;
mod shutdown;
mod signals;
#[cfg(test)]
mod testutil;
mod watcher;

use clap::Parser;
use config::{CoordinatorConfig, Settings};
use orchestrator::Orchestrator;
use shutdown::ShutdownCoordinator;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Run a multi-threaded workload alongside a CPU/thread sampler: start the
/// workload, hand its thread ids to the sampler, and tear both down when the
/// workload finishes or on SIGINT/SIGTERM.
#[derive(Parser, Debug)]
#[command(name = "perfwatch", version, about)]
pub struct Cli {
    /// Directory containing the workload and sampler executables
    #[arg(short = 'P', long)]
    path: Option<PathBuf>,

    /// Workload order parameter [default: 30]
    #[arg(short = 'n', long)]
    number: Option<u32>,

    /// Number of workload threads [default: 4]
    #[arg(short = 'j', long)]
    threads: Option<u32>,

    /// Interval between sampler polls, in milliseconds [default: 500]
    #[arg(short, long)]
    interval: Option<u64>,

    /// CSV file where the sampler writes CPU stats [default: cpu_stats.csv]
    #[arg(long)]
    cpu_file: Option<String>,

    /// CSV file where the sampler writes PID stats [default: pid_stats.csv]
    #[arg(long)]
    pid_file: Option<String>,

    /// How often the workload is checked for exit, in milliseconds [default: 100]
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Config file path
    #[arg(short, long, default_value = "perfwatch.toml")]
    config: PathBuf,

    /// Print resolved settings and exit without launching anything
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (state changes, liveness polls)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Overlay command-line values on top of the file configuration.
    fn apply_overrides(&self, config: &mut CoordinatorConfig) {
        if let Some(path) = &self.path {
            config.executables.dir = path.clone();
        }
        if let Some(number) = self.number {
            config.workload.order = number;
        }
        if let Some(threads) = self.threads {
            config.workload.threads = threads;
        }
        if let Some(interval) = self.interval {
            config.sampler.interval_ms = interval;
        }
        if let Some(cpu_file) = &self.cpu_file {
            config.sampler.cpu_file = cpu_file.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.sampler.pid_file = pid_file.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            config.watcher.poll_interval_ms = poll_ms;
        }
    }

    fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_level()));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_env_filter(filter)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(2);
        }
    };
    cli.apply_overrides(&mut config);
    let settings = match Settings::resolve(config) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(2);
        }
    };

    if cli.dry_run {
        println!("{settings}");
        println!("Dry run mode, nothing launched.");
        return ExitCode::SUCCESS;
    }

    let mut orchestrator = Orchestrator::new(settings, ShutdownCoordinator::new());
    match orchestrator.run().await {
        Ok(report) => {
            tracing::info!(
                thread_ids = ?report.thread_ids,
                workload_killed = report.workload_terminated,
                sampler_killed = report.sampler_terminated,
                state = ?orchestrator.state(),
                "perfwatch finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(state = ?orchestrator.state(), "{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags_override_config() {
        let cli = Cli::try_parse_from([
            "perfwatch", "-P", "/opt/bin", "-n", "10", "-j", "2", "-i", "250",
        ])
        .unwrap();
        let mut config = CoordinatorConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.executables.dir, PathBuf::from("/opt/bin"));
        assert_eq!(config.workload.order, 10);
        assert_eq!(config.workload.threads, 2);
        assert_eq!(config.sampler.interval_ms, 250);
        // Untouched values keep their defaults.
        assert_eq!(config.sampler.cpu_file, "cpu_stats.csv");
        assert_eq!(config.watcher.poll_interval_ms, 100);
    }

    #[test]
    fn test_long_flags_override_config() {
        let cli = Cli::try_parse_from([
            "perfwatch",
            "--path",
            "bin",
            "--number",
            "12",
            "--threads",
            "8",
            "--interval",
            "1000",
            "--cpu-file",
            "c.csv",
            "--pid-file",
            "",
            "--poll-ms",
            "50",
        ])
        .unwrap();
        let mut config = CoordinatorConfig::default();
        cli.apply_overrides(&mut config);

        let settings = Settings::resolve(config).unwrap();
        assert_eq!(settings.workload_path(), PathBuf::from("bin/workload"));
        assert_eq!(settings.order, 12);
        assert_eq!(settings.threads, 8);
        assert_eq!(settings.interval_ms, 1000);
        assert_eq!(settings.cpu_file, "c.csv");
        assert_eq!(settings.pid_file, "");
        assert_eq!(settings.poll_interval.as_millis(), 50);
    }

    #[test]
    fn test_no_flags_leave_file_values() {
        let cli = Cli::try_parse_from(["perfwatch"]).unwrap();
        let mut config = CoordinatorConfig::default();
        config.workload.order = 99;
        cli.apply_overrides(&mut config);
        assert_eq!(config.workload.order, 99);
        assert_eq!(cli.config, PathBuf::from("perfwatch.toml"));
        assert_eq!(cli.default_log_level(), "info");
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["perfwatch", "-v", "-q"]).is_err());
        let cli = Cli::try_parse_from(["perfwatch", "--verbose"]).unwrap();
        assert_eq!(cli.default_log_level(), "debug");
        let cli = Cli::try_parse_from(["perfwatch", "-q"]).unwrap();
        assert_eq!(cli.default_log_level(), "warn");
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
