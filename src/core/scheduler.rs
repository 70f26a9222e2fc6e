use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::config::StaggerConfig;
use crate::core::job::{JobSnapshot, JobState};
use crate::core::supervisor::{Job, StartOutcome};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// The live, ordered job collection. Order decides start priority.
pub type JobList = Arc<RwLock<Vec<Job>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub phase_one: u32,
    pub other: u32,
}

impl PhaseCounts {
    pub fn tally<'a>(states: impl IntoIterator<Item = &'a JobState>) -> Self {
        let mut counts = Self::default();
        for state in states.into_iter().filter(|state| state.running) {
            if state.phase == 1 {
                counts.phase_one += 1;
            } else {
                counts.other += 1;
            }
        }
        counts
    }

    pub fn blocks(&self, config: &StaggerConfig) -> bool {
        let phase_one_full = config.phase_one_limit > 0 && self.phase_one >= config.phase_one_limit;
        let other_full = config.other_limit > 0 && self.other >= config.other_limit;
        phase_one_full || other_full
    }
}

pub fn is_eligible(snapshot: &JobSnapshot) -> bool {
    snapshot.state.is_ready()
        && !snapshot.descriptor.manage_self
        && !snapshot.descriptor.target_reached(snapshot.session_done)
}

struct Worker {
    cancel: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Starts jobs one at a time, spacing them out and holding back while the
/// configured phase ceilings are full.
pub struct Scheduler {
    config: StaggerConfig,
    jobs: JobList,
    worker: Option<Worker>,
}

impl Scheduler {
    pub fn new(config: StaggerConfig, jobs: JobList) -> Self {
        Self {
            config,
            jobs,
            worker: None,
        }
    }

    pub fn config(&self) -> StaggerConfig {
        self.config
    }

    pub fn set_config(&mut self, config: StaggerConfig) {
        self.config = config;
    }

    pub fn jobs(&self) -> JobList {
        Arc::clone(&self.jobs)
    }

    pub fn is_staggering(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker| !worker.handle.is_finished())
    }

    pub fn start_all(&mut self, tick: Duration) {
        self.cancel();

        for job in current_jobs(&self.jobs) {
            if let Err(err) = job.reset_session() {
                warn!(job = job.id(), error = %err, "could not reset session count");
            }
        }

        let (cancel, cancel_rx) = mpsc::channel::<()>();
        let session = Session::new(self.config, Arc::clone(&self.jobs), tick, cancel_rx);
        let spawned = thread::Builder::new()
            .name("stagger".to_string())
            .spawn(move || session.run());
        match spawned {
            Ok(handle) => {
                info!(
                    static_delay_secs = self.config.static_delay.as_secs(),
                    phase_one_limit = self.config.phase_one_limit,
                    other_limit = self.config.other_limit,
                    "staggering started"
                );
                self.worker = Some(Worker { cancel, handle });
            }
            Err(err) => error!(error = %err, "could not start stagger thread"),
        }
    }

    /// Halts admissions. Jobs already running keep running.
    pub fn cancel(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.cancel.send(());
            if worker.handle.join().is_err() {
                error!("stagger thread panicked");
            }
            info!("staggering cancelled");
        }
    }

    pub fn stop_all(&mut self) {
        self.cancel();
        for job in current_jobs(&self.jobs) {
            if let Err(err) = job.stop(false) {
                warn!(job = job.id(), error = %err, "stop failed");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn current_jobs(jobs: &JobList) -> Vec<Job> {
    jobs.read().unwrap_or_else(PoisonError::into_inner).clone()
}

struct Session {
    config: StaggerConfig,
    jobs: JobList,
    tick: Duration,
    cancel: Receiver<()>,
    skipped: HashSet<usize>,
}

impl Session {
    fn new(config: StaggerConfig, jobs: JobList, tick: Duration, cancel: Receiver<()>) -> Self {
        Self {
            config,
            jobs,
            tick,
            cancel,
            skipped: HashSet::new(),
        }
    }

    fn run(mut self) {
        if !self.pause(self.config.static_delay) {
            return;
        }

        loop {
            while self.blocked() {
                if !self.pause(self.tick) {
                    return;
                }
            }

            if let Some(job) = self.next_eligible() {
                match job.resume() {
                    Ok(StartOutcome::Started) => info!(job = job.id(), "stagger admitted job"),
                    Ok(StartOutcome::AlreadyRunning) => {
                        debug!(job = job.id(), "job was already running")
                    }
                    Err(err) => {
                        error!(job = job.id(), error = %err, "stagger start failed, skipping job this session");
                        self.skipped.insert(job.id());
                    }
                }
            }

            if !self.pause(self.tick) {
                return;
            }
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns false once the
    /// session should end.
    fn pause(&self, duration: Duration) -> bool {
        matches!(self.cancel.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    fn blocked(&self) -> bool {
        let jobs = current_jobs(&self.jobs);
        let states: Vec<JobState> = jobs
            .iter()
            .map(|job| {
                job.read(|snapshot| JobState {
                    running: snapshot.state.running,
                    phase: snapshot.state.phase,
                    ..JobState::default()
                })
            })
            .collect();
        PhaseCounts::tally(&states).blocks(&self.config)
    }

    fn next_eligible(&self) -> Option<Job> {
        current_jobs(&self.jobs)
            .into_iter()
            .filter(|job| !self.skipped.contains(&job.id()))
            .find(|job| job.read(is_eligible))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::job::{JobDescriptor, JobStats, KeySource, SupervisorStatus};

    fn state(running: bool, phase: u8) -> JobState {
        JobState {
            status: if running {
                SupervisorStatus::Running
            } else {
                SupervisorStatus::Idle
            },
            running,
            phase,
            ..JobState::default()
        }
    }

    fn limits(phase_one_limit: u32, other_limit: u32) -> StaggerConfig {
        StaggerConfig {
            static_delay: Duration::ZERO,
            phase_one_limit,
            other_limit,
        }
    }

    fn snapshot(plots_to_finish: u32, manage_self: bool, state: JobState, session_done: u32) -> JobSnapshot {
        JobSnapshot {
            descriptor: JobDescriptor {
                name: "job".into(),
                key: KeySource::fingerprint("abc123"),
                ram_mib: 3390,
                threads: 2,
                temp_dir: PathBuf::from("/tmp"),
                dest_dir: PathBuf::from("/plots"),
                plots_to_finish,
                manage_self,
            },
            state,
            stats: JobStats::default(),
            session_done,
        }
    }

    #[test]
    fn only_running_jobs_are_counted() {
        let states = [state(true, 1), state(true, 1), state(true, 3), state(false, 1), state(true, 0)];
        let counts = PhaseCounts::tally(&states);
        assert_eq!(counts, PhaseCounts { phase_one: 2, other: 2 });
    }

    #[test]
    fn phase_one_ceiling_blocks_at_limit() {
        let counts = PhaseCounts { phase_one: 2, other: 0 };
        assert!(counts.blocks(&limits(2, 0)));
        assert!(!counts.blocks(&limits(3, 0)));
        assert!(!PhaseCounts { phase_one: 1, other: 0 }.blocks(&limits(2, 0)));
    }

    #[test]
    fn zero_ceilings_never_block() {
        let counts = PhaseCounts { phase_one: 50, other: 50 };
        assert!(!counts.blocks(&limits(0, 0)));
    }

    #[test]
    fn other_phase_ceiling_is_independent() {
        let counts = PhaseCounts { phase_one: 0, other: 1 };
        assert!(counts.blocks(&limits(0, 1)));
        assert!(!counts.blocks(&limits(1, 0)));
    }

    #[test]
    fn eligibility_rules() {
        assert!(is_eligible(&snapshot(2, false, state(false, 0), 1)));
        assert!(!is_eligible(&snapshot(2, false, state(false, 0), 2)));
        assert!(is_eligible(&snapshot(0, false, state(false, 0), 1000)));
        assert!(!is_eligible(&snapshot(0, true, state(false, 0), 0)));
        assert!(!is_eligible(&snapshot(0, false, state(true, 2), 0)));
    }
}
