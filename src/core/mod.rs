pub mod batch;
pub mod cleanup;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod formatter;
pub mod job;
pub mod keys;
pub mod runner;
pub mod scheduler;
pub mod summary;
pub mod supervisor;

pub use config::{PlotterConfig, RetryPolicy, StaggerConfig};
pub use error::PlotterError;
pub use job::{JobDescriptor, JobSnapshot, JobState, JobStats, KeySource, SupervisorStatus};
pub use scheduler::{JobList, Scheduler};
pub use summary::PlotResult;
pub use supervisor::{Job, RefreshFn, StartOutcome};
