use std::path::PathBuf;
use std::time::Duration;

/// Plots smaller than this budget use the plotter's own default buffer.
pub const MINIMUM_RAM_MIB: u32 = 2500;

const LOG_DIR_NAME: &str = ".plotherd";
const PLOT_LOG_DIR_NAME: &str = "plotLogs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlotterConfig {
    /// Shell-words command line of the plotter, e.g. `chia` or
    /// `python -m chia`. Plotting arguments are appended after it.
    pub executable: String,
    pub log_dir: PathBuf,
    pub min_ram_mib: u32,
    pub sync_timeout: Duration,
    pub cleanup: RetryPolicy,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            executable: "chia".to_string(),
            log_dir: default_log_dir(),
            min_ram_mib: MINIMUM_RAM_MIB,
            sync_timeout: Duration::from_secs(100),
            cleanup: RetryPolicy::default(),
        }
    }
}

/// Admission limits for the stagger scheduler. A limit of `0` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaggerConfig {
    pub static_delay: Duration,
    pub phase_one_limit: u32,
    pub other_limit: u32,
}

impl Default for StaggerConfig {
    fn default() -> Self {
        Self {
            static_delay: Duration::ZERO,
            phase_one_limit: 0,
            other_limit: 0,
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(LOG_DIR_NAME)
        .join(PLOT_LOG_DIR_NAME)
}
