use std::path::PathBuf;

use crate::core::summary::PlotResult;

/// Key material handed to the plotter. A fingerprint takes precedence over
/// a farmer/pool key pair when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySource {
    pub fingerprint: String,
    pub farmer_key: String,
    pub pool_key: String,
}

impl KeySource {
    pub fn fingerprint(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ..Self::default()
        }
    }

    pub fn key_pair(farmer_key: impl Into<String>, pool_key: impl Into<String>) -> Self {
        Self {
            fingerprint: String::new(),
            farmer_key: farmer_key.into(),
            pool_key: pool_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub key: KeySource,
    pub ram_mib: u32,
    pub threads: u32,
    pub temp_dir: PathBuf,
    pub dest_dir: PathBuf,
    /// Number of plots to produce per session; `0` keeps going until stopped.
    pub plots_to_finish: u32,
    /// Self-managing jobs are never started by the stagger scheduler.
    pub manage_self: bool,
}

impl JobDescriptor {
    pub fn is_unbounded(&self) -> bool {
        self.plots_to_finish == 0
    }

    pub fn target_reached(&self, done: u32) -> bool {
        !self.is_unbounded() && done >= self.plots_to_finish
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStatus {
    Idle,
    Starting,
    Running,
    Completing,
}

/// Run-time status of the current run. Replaced wholesale on every stop.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub status: SupervisorStatus,
    pub running: bool,
    pub phase: u8,
    pub sub_phase: String,
    pub plot_id: String,
    pub logs: Vec<String>,
    pub current_result: PlotResult,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: SupervisorStatus::Idle,
            running: false,
            phase: 0,
            sub_phase: String::new(),
            plot_id: String::new(),
            logs: Vec::new(),
            current_result: PlotResult::default(),
        }
    }
}

impl JobState {
    pub fn is_ready(&self) -> bool {
        !self.running && self.status == SupervisorStatus::Idle
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStats {
    pub plots_done: u32,
    pub results: Vec<PlotResult>,
}

impl JobStats {
    pub fn record(&mut self, result: PlotResult) {
        self.plots_done += 1;
        self.results.push(result);
    }

    pub fn last_result(&self) -> Option<&PlotResult> {
        self.results.last()
    }

    pub fn average_total_time(&self) -> Option<f64> {
        let totals: Vec<f64> = self.results.iter().filter_map(|r| r.total_time).collect();
        if totals.is_empty() {
            return None;
        }
        Some(totals.iter().sum::<f64>() / totals.len() as f64)
    }
}

#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub descriptor: JobDescriptor,
    pub state: JobState,
    pub stats: JobStats,
    /// Plots completed since the session began: an explicit `start` or a
    /// new stagger session.
    pub session_done: u32,
}
