use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from perfwatch.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub executables: ExecutablesConfig,
    pub workload: WorkloadConfig,
    pub sampler: SamplerConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutablesConfig {
    /// Directory holding both executables.
    pub dir: PathBuf,
    pub workload: String,
    pub sampler: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub order: u32,
    pub threads: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub interval_ms: u64,
    /// Empty means the sampler gets no `--cpu-file` flag.
    pub cpu_file: String,
    /// Empty means the sampler gets no `--pid-file` flag.
    pub pid_file: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
}

// --- Default implementations ---

impl Default for ExecutablesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./build/bin"),
            workload: "workload".to_string(),
            sampler: "sampler".to_string(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            order: 30,
            threads: 4,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            cpu_file: "cpu_stats.csv".to_string(),
            pid_file: "pid_stats.csv".to_string(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<CoordinatorConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(CoordinatorConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fully resolved, validated run parameters.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bin_dir: PathBuf,
    pub workload_exe: String,
    pub sampler_exe: String,
    pub order: u32,
    pub threads: u32,
    pub interval_ms: u64,
    pub cpu_file: String,
    pub pid_file: String,
    pub poll_interval: Duration,
    /// Forward SIGINT/SIGTERM into the shutdown flag while running.
    pub handle_signals: bool,
}

impl Settings {
    pub fn resolve(config: CoordinatorConfig) -> Result<Settings, ConfigError> {
        if config.workload.threads == 0 {
            return Err(ConfigError::Invalid(
                "workload thread count must be at least 1".to_string(),
            ));
        }
        if config.sampler.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampler interval must be at least 1ms".to_string(),
            ));
        }
        if config.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watcher poll interval must be at least 1ms".to_string(),
            ));
        }
        if config.executables.workload.is_empty() || config.executables.sampler.is_empty() {
            return Err(ConfigError::Invalid(
                "executable names must not be empty".to_string(),
            ));
        }

        Ok(Settings {
            bin_dir: config.executables.dir,
            workload_exe: config.executables.workload,
            sampler_exe: config.executables.sampler,
            order: config.workload.order,
            threads: config.workload.threads,
            interval_ms: config.sampler.interval_ms,
            cpu_file: config.sampler.cpu_file,
            pid_file: config.sampler.pid_file,
            poll_interval: Duration::from_millis(config.watcher.poll_interval_ms),
            handle_signals: true,
        })
    }

    pub fn workload_path(&self) -> PathBuf {
        self.bin_dir.join(&self.workload_exe)
    }

    pub fn sampler_path(&self) -> PathBuf {
        self.bin_dir.join(&self.sampler_exe)
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "workload: {}", self.workload_path().display())?;
        writeln!(f, "  order: {}", self.order)?;
        writeln!(f, "  threads: {}", self.threads)?;
        writeln!(f, "sampler: {}", self.sampler_path().display())?;
        writeln!(f, "  interval_ms: {}", self.interval_ms)?;
        writeln!(f, "  cpu_file: {}", self.cpu_file)?;
        writeln!(f, "  pid_file: {}", self.pid_file)?;
        write!(f, "watcher poll_interval_ms: {}", self.poll_interval.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let settings = Settings::resolve(CoordinatorConfig::default()).unwrap();
        assert_eq!(settings.bin_dir, PathBuf::from("./build/bin"));
        assert_eq!(settings.order, 30);
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.interval_ms, 500);
        assert_eq!(settings.cpu_file, "cpu_stats.csv");
        assert_eq!(settings.pid_file, "pid_stats.csv");
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert!(settings.handle_signals);
        assert_eq!(settings.workload_path(), PathBuf::from("./build/bin/workload"));
        assert_eq!(settings.sampler_path(), PathBuf::from("./build/bin/sampler"));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            [workload]
            order = 10

            [watcher]
            poll_interval_ms = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.workload.order, 10);
        assert_eq!(config.workload.threads, 4);
        assert_eq!(config.watcher.poll_interval_ms, 25);
        assert_eq!(config.sampler.interval_ms, 500);
        assert_eq!(config.executables.workload, "workload");
    }

    #[test]
    fn test_custom_executable_names() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            [executables]
            dir = "/opt/bench"
            workload = "fib"
            sampler = "cpustats"
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(config).unwrap();
        assert_eq!(settings.workload_path(), PathBuf::from("/opt/bench/fib"));
        assert_eq!(settings.sampler_path(), PathBuf::from("/opt/bench/cpustats"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.workload.order, 30);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perfwatch.toml");
        std::fs::write(&path, "[workload\norder = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("perfwatch.toml"));
    }

    #[test]
    fn test_directory_as_config_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut config = CoordinatorConfig::default();
        config.workload.threads = 0;
        let err = Settings::resolve(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = CoordinatorConfig::default();
        config.sampler.interval_ms = 0;
        assert!(Settings::resolve(config).is_err());

        let mut config = CoordinatorConfig::default();
        config.watcher.poll_interval_ms = 0;
        assert!(Settings::resolve(config).is_err());
    }

    #[test]
    fn test_display_lists_resolved_values() {
        let settings = Settings::resolve(CoordinatorConfig::default()).unwrap();
        let text = settings.to_string();
        assert!(text.contains("threads: 4"));
        assert!(text.contains("cpu_file: cpu_stats.csv"));
        assert!(text.contains("poll_interval_ms: 100"));
    }
}
