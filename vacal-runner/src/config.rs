//! Runner configuration
//!
//! Defines all configurable parameters for job execution including the
//! script interpreter, file locations, timeouts and the log poll interval.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use vacal_core::domain::job::JobId;
use vacal_core::domain::params::CalibrationMode;

/// Runner configuration
///
/// The job timeout applies to every mode unless a per-mode override is set.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program used to run the calibration scripts (e.g., "Rscript")
    pub interpreter: PathBuf,

    /// Directory containing the per-mode calibration scripts
    pub scripts_dir: PathBuf,

    /// Directory where one log file per job is written
    pub log_dir: PathBuf,

    /// Maximum wall-clock time a job can run before it is killed
    pub job_timeout: Duration,

    /// Timeouts that replace `job_timeout` for specific modes
    pub mode_timeouts: HashMap<CalibrationMode, Duration>,

    /// How often a following log reader checks for new content
    pub poll_interval: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(scripts_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: PathBuf::from("Rscript"),
            scripts_dir: scripts_dir.into(),
            log_dir: log_dir.into(),
            job_timeout: Duration::from_secs(600), // 10 minutes
            mode_timeouts: HashMap::new(),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - VACAL_INTERPRETER (default: Rscript)
    /// - VACAL_SCRIPTS_DIR (default: scripts)
    /// - VACAL_LOG_DIR (default: logs)
    /// - VACAL_JOB_TIMEOUT (seconds, default: 600)
    /// - VACAL_TIMEOUT_FULL, VACAL_TIMEOUT_CALIBRATION_ONLY, VACAL_TIMEOUT_ENSEMBLE (seconds)
    /// - VACAL_POLL_INTERVAL_MS (milliseconds, default: 500)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(interpreter) = std::env::var("VACAL_INTERPRETER") {
            config.interpreter = PathBuf::from(interpreter);
        }

        if let Ok(dir) = std::env::var("VACAL_SCRIPTS_DIR") {
            config.scripts_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("VACAL_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(timeout) = env_secs("VACAL_JOB_TIMEOUT")? {
            config.job_timeout = timeout;
        }

        for mode in CalibrationMode::ALL {
            let var = format!("VACAL_TIMEOUT_{}", mode.as_str().to_ascii_uppercase());
            if let Some(timeout) = env_secs(&var)? {
                config.mode_timeouts.insert(mode, timeout);
            }
        }

        if let Ok(value) = std::env::var("VACAL_POLL_INTERVAL_MS") {
            let millis = value
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("VACAL_POLL_INTERVAL_MS must be an integer"))?;
            config.poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Sets a timeout for one mode
    pub fn with_mode_timeout(mut self, mode: CalibrationMode, timeout: Duration) -> Self {
        self.mode_timeouts.insert(mode, timeout);
        self
    }

    /// Timeout that applies to a job of the given mode
    pub fn timeout_for(&self, mode: CalibrationMode) -> Duration {
        self.mode_timeouts
            .get(&mode)
            .copied()
            .unwrap_or(self.job_timeout)
    }

    /// Path of the log file for a job
    pub fn log_path(&self, id: JobId) -> PathBuf {
        self.log_dir.join(format!("{}.log", id))
    }

    /// Path of the script implementing a mode
    pub fn script_path(&self, mode: CalibrationMode) -> PathBuf {
        self.scripts_dir.join(mode.script_name())
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interpreter.as_os_str().is_empty() {
            anyhow::bail!("interpreter cannot be empty");
        }

        if self.log_dir.as_os_str().is_empty() {
            anyhow::bail!("log_dir cannot be empty");
        }

        if self.job_timeout.is_zero() {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if let Some((mode, _)) = self.mode_timeouts.iter().find(|(_, t)| t.is_zero()) {
            anyhow::bail!("timeout for mode {} must be greater than 0", mode);
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new("scripts", "logs")
    }
}

fn env_secs(var: &str) -> anyhow::Result<Option<Duration>> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| anyhow::anyhow!("{} must be a number of seconds", var)),
        Err(_) => Ok(None),
    }
}
