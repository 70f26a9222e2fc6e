//! Per-job process supervision.
//!
//! Each [`Job`] owns one supervisor thread. Process output, exit
//! notifications and user commands all arrive on that thread's channel, so
//! it is the only writer of the job's state. Readers look at the shared
//! snapshot under a read lock.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use tracing::{debug, error, info, warn};

use crate::core::cleanup;
use crate::core::command::{Executable, PlotCommand};
use crate::core::config::PlotterConfig;
use crate::core::error::PlotterError;
use crate::core::event::{classify, LineEvent};
use crate::core::job::{JobDescriptor, JobSnapshot, JobState, JobStats, SupervisorStatus};
use crate::core::runner::{self, ProcessHandle};
use crate::core::summary::PlotResult;

/// Called with the job id whenever a job's state changes materially. Runs on
/// the supervisor thread and must not wait on the job it is told about.
pub type RefreshFn = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

enum Command {
    Start {
        new_session: bool,
        reply: Sender<Result<StartOutcome, PlotterError>>,
    },
    ResetSession {
        reply: Sender<()>,
    },
    Stop {
        block: bool,
        reply: Sender<()>,
    },
    SetDescriptor(JobDescriptor),
    Line {
        generation: u64,
        line: String,
    },
    Exited {
        generation: u64,
        elapsed: f64,
    },
    Shutdown,
}

struct JobInner {
    id: usize,
    tx: Sender<Command>,
    shared: Arc<RwLock<JobSnapshot>>,
}

impl Drop for JobInner {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("id", &self.inner.id).finish()
    }
}

impl Job {
    pub fn spawn(
        id: usize,
        descriptor: JobDescriptor,
        config: PlotterConfig,
        refresh: Option<RefreshFn>,
    ) -> Result<Self, PlotterError> {
        let executable = Executable::parse(&config.executable)?;
        let shared = Arc::new(RwLock::new(JobSnapshot {
            descriptor,
            state: JobState::default(),
            stats: JobStats::default(),
            session_done: 0,
        }));
        let (tx, rx) = mpsc::channel::<Command>();

        let supervisor = Supervisor {
            id,
            config,
            executable,
            generation: 0,
            process: None,
            tx: tx.clone(),
            shared: Arc::clone(&shared),
            refresh,
        };
        thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || supervisor.run(rx))?;

        Ok(Self {
            inner: Arc::new(JobInner { id, tx, shared }),
        })
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Launches the plotter and begins a new session, so the target count
    /// starts over.
    pub fn start(&self) -> Result<StartOutcome, PlotterError> {
        self.request_start(true)
    }

    /// Launches the plotter within the current session. Plots already
    /// completed in it still count toward the target.
    pub fn resume(&self) -> Result<StartOutcome, PlotterError> {
        self.request_start(false)
    }

    pub fn reset_session(&self) -> Result<(), PlotterError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::ResetSession { reply })?;
        rx.recv().map_err(|_| PlotterError::SupervisorGone)
    }

    /// Kills the current run and removes its scratch files. With `block`
    /// the call returns only once every deletion has finished.
    pub fn stop(&self, block: bool) -> Result<(), PlotterError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Stop { block, reply })?;
        rx.recv().map_err(|_| PlotterError::SupervisorGone)
    }

    pub fn set_descriptor(&self, descriptor: JobDescriptor) -> Result<(), PlotterError> {
        self.send(Command::SetDescriptor(descriptor))
    }

    pub fn read<R>(&self, f: impl FnOnce(&JobSnapshot) -> R) -> R {
        let guard = self
            .inner
            .shared
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.read(|snapshot| snapshot.clone())
    }

    pub fn descriptor(&self) -> JobDescriptor {
        self.read(|snapshot| snapshot.descriptor.clone())
    }

    pub fn stats(&self) -> JobStats {
        self.read(|snapshot| snapshot.stats.clone())
    }

    pub fn is_running(&self) -> bool {
        self.read(|snapshot| snapshot.state.running)
    }

    fn request_start(&self, new_session: bool) -> Result<StartOutcome, PlotterError> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Start { new_session, reply })?;
        rx.recv().map_err(|_| PlotterError::SupervisorGone)?
    }

    fn send(&self, command: Command) -> Result<(), PlotterError> {
        self.inner
            .tx
            .send(command)
            .map_err(|_| PlotterError::SupervisorGone)
    }
}

struct Supervisor {
    id: usize,
    config: PlotterConfig,
    executable: Executable,
    generation: u64,
    process: Option<ProcessHandle>,
    tx: Sender<Command>,
    shared: Arc<RwLock<JobSnapshot>>,
    refresh: Option<RefreshFn>,
}

impl Supervisor {
    fn run(mut self, rx: Receiver<Command>) {
        for command in rx {
            match command {
                Command::Start { new_session, reply } => {
                    let _ = reply.send(self.start(new_session));
                }
                Command::ResetSession { reply } => {
                    self.update(|snapshot| snapshot.session_done = 0);
                    let _ = reply.send(());
                    self.notify();
                }
                Command::Stop { block, reply } => {
                    self.stop(block);
                    let _ = reply.send(());
                }
                Command::SetDescriptor(descriptor) => {
                    self.update(|snapshot| snapshot.descriptor = descriptor);
                    self.notify();
                }
                Command::Line { generation, line } => self.on_line(generation, line),
                Command::Exited {
                    generation,
                    elapsed,
                } => self.on_exit(generation, elapsed),
                Command::Shutdown => {
                    self.stop(false);
                    break;
                }
            }
        }
        debug!(job = self.id, "supervisor finished");
    }

    fn update<R>(&self, f: impl FnOnce(&mut JobSnapshot) -> R) -> R {
        let mut guard = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn notify(&self) {
        if let Some(refresh) = &self.refresh {
            refresh(self.id);
        }
    }

    fn start(&mut self, new_session: bool) -> Result<StartOutcome, PlotterError> {
        let (running, descriptor) =
            self.update(|snapshot| (snapshot.state.running, snapshot.descriptor.clone()));
        let alive = self.process.as_ref().map_or(false, ProcessHandle::is_alive);
        if running || alive {
            warn!(job = self.id, name = %descriptor.name, "start ignored, plotter still running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let args = PlotCommand::from_descriptor(&descriptor, self.config.min_ram_mib).to_args();
        self.generation += 1;
        let generation = self.generation;
        let line_tx = self.tx.clone();
        let exit_tx = self.tx.clone();

        debug!(job = self.id, ?args, "starting plotter");
        self.update(|snapshot| snapshot.state.status = SupervisorStatus::Starting);
        let spawned = runner::spawn(
            &self.executable,
            &args,
            &self.config.log_dir,
            move |line| {
                let _ = line_tx.send(Command::Line { generation, line });
            },
            move |elapsed| {
                let _ = exit_tx.send(Command::Exited {
                    generation,
                    elapsed,
                });
            },
        );
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.update(|snapshot| snapshot.state.status = SupervisorStatus::Idle);
                return Err(err);
            }
        };

        info!(job = self.id, name = %descriptor.name, pid = handle.pid(), "job started");
        self.process = Some(handle);
        self.update(|snapshot| {
            snapshot.state = JobState {
                status: SupervisorStatus::Running,
                running: true,
                ..JobState::default()
            };
            if new_session {
                snapshot.session_done = 0;
            }
        });
        self.notify();
        Ok(StartOutcome::Started)
    }

    fn stop(&mut self, block: bool) {
        self.generation += 1;
        let (plot_id, temp_dir, was_running) = self.update(|snapshot| {
            let plot_id = std::mem::take(&mut snapshot.state.plot_id);
            let was_running = snapshot.state.running;
            snapshot.state = JobState::default();
            (plot_id, snapshot.descriptor.temp_dir.clone(), was_running)
        });

        if let Some(process) = self.process.take() {
            process.kill();
        }
        if was_running {
            info!(job = self.id, plot_id = %plot_id, "job stopped");
        }
        self.notify();

        let cleanup = cleanup::delete_temp_files(&temp_dir, &plot_id, self.config.cleanup);
        if block && !cleanup.is_empty() {
            let report = cleanup.wait();
            debug!(
                job = self.id,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "temp cleanup finished"
            );
        }
    }

    fn on_line(&mut self, generation: u64, line: String) {
        if generation != self.generation {
            debug!(job = self.id, "dropping output of a stopped run");
            return;
        }

        let event = match classify(&line) {
            Ok(event) => event,
            Err(warning) => {
                warn!(job = self.id, "{warning}");
                LineEvent::Unrecognized
            }
        };

        let id = self.id;
        let material = self.update(|snapshot| {
            let state = &mut snapshot.state;
            state.logs.push(line.trim().to_string());
            apply_event(id, state, event)
        });
        if material {
            self.notify();
        }
    }

    fn on_exit(&mut self, generation: u64, elapsed: f64) {
        if generation != self.generation {
            debug!(job = self.id, "ignoring exit of a stopped run");
            return;
        }

        let (again, done, name) = self.update(|snapshot| {
            snapshot.state.status = SupervisorStatus::Completing;
            let result = snapshot.state.current_result;
            snapshot.stats.record(result);
            snapshot.session_done += 1;
            let again = snapshot.state.running
                && !snapshot.descriptor.target_reached(snapshot.session_done);
            (again, snapshot.session_done, snapshot.descriptor.name.clone())
        });
        info!(job = self.id, name = %name, elapsed, done, "plot finished");

        self.stop(false);
        if again {
            if let Err(err) = self.start(false) {
                error!(job = self.id, name = %name, error = %err, "automatic restart failed");
            }
        }
    }
}

/// Applies one classified line to the state. Returns whether anything a
/// viewer cares about changed.
fn apply_event(job: usize, state: &mut JobState, event: LineEvent) -> bool {
    match event {
        LineEvent::PlotIdAssigned(id) => {
            if state.plot_id.is_empty() {
                state.plot_id = id;
                return true;
            }
            if state.plot_id != id {
                debug!(job, current = %state.plot_id, ignored = %id, "plot id already assigned");
            }
            false
        }
        LineEvent::PhaseStarted(phase) => {
            if phase < state.phase {
                warn!(job, current = state.phase, reported = phase, "ignoring phase regression");
                return false;
            }
            state.phase = phase;
            true
        }
        LineEvent::SubPhaseUpdate(label) => {
            state.sub_phase = label;
            true
        }
        LineEvent::PhaseTimed { phase, seconds } => match PlotResult::with_phase_time(phase, seconds) {
            Some(partial) => {
                state.current_result = state.current_result.merge(&partial);
                true
            }
            None => false,
        },
        LineEvent::TotalTimed(seconds) => {
            state.current_result = state.current_result.merge(&PlotResult::with_total_time(seconds));
            true
        }
        LineEvent::CopyTimed(seconds) => {
            state.current_result = state.current_result.merge(&PlotResult::with_copy_time(seconds));
            true
        }
        LineEvent::Unrecognized => false,
    }
}
