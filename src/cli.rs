use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::core::batch::read_job_lines;
use crate::core::config::{default_log_dir, PlotterConfig, StaggerConfig};
use crate::core::error::PlotterError;
use crate::core::job::{JobDescriptor, KeySource};
use crate::core::scheduler::{JobList, DEFAULT_TICK};
use crate::core::supervisor::{Job, RefreshFn};

#[derive(Debug, Parser)]
#[command(name = "plotherd", version, about = "Staggered plotting job supervisor")]
pub struct Cli {
    /// Plotter command line, e.g. "chia" or "python -m chia"
    #[arg(long = "exe", global = true, default_value = "chia")]
    pub executable: String,
    /// Directory for per-run plot logs
    #[arg(long = "log-dir", global = true)]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Supervise the jobs of a job file
    Run(RunArgs),
    /// List the keys known to the plotter
    Keys,
    /// Print the plotter arguments of every job in a job file
    Args(JobsFileArgs),
}

#[derive(Debug, Args)]
pub struct JobsFileArgs {
    /// Job file, one job per line
    #[arg(value_name = "FILE")]
    pub jobs: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(value_name = "FILE")]
    pub jobs: PathBuf,
    /// Minutes to wait before the first staggered start
    #[arg(long = "stagger-minutes", default_value_t = 0)]
    pub stagger_minutes: u64,
    /// Most jobs allowed in phase 1 at admission time (0 = no limit)
    #[arg(long = "phase1-limit", default_value_t = 0)]
    pub phase_one_limit: u32,
    /// Most jobs allowed in other phases at admission time (0 = no limit)
    #[arg(long = "other-limit", default_value_t = 0)]
    pub other_limit: u32,
    /// Scheduler tick in milliseconds
    #[arg(long = "tick-ms", default_value_t = DEFAULT_TICK.as_millis() as u64)]
    pub tick_ms: u64,
    /// Start staggering immediately
    #[arg(long)]
    pub start: bool,
    /// Line console instead of the dashboard
    #[arg(long)]
    pub console: bool,
}

impl RunArgs {
    pub fn stagger_config(&self) -> StaggerConfig {
        StaggerConfig {
            static_delay: Duration::from_secs(self.stagger_minutes.saturating_mul(60)),
            phase_one_limit: self.phase_one_limit,
            other_limit: self.other_limit,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Cli {
    pub fn plotter_config(&self) -> PlotterConfig {
        PlotterConfig {
            executable: self.executable.clone(),
            log_dir: self.log_dir.clone().unwrap_or_else(default_log_dir),
            ..PlotterConfig::default()
        }
    }
}

/// One job as written in a job file.
#[derive(Debug, Parser)]
#[command(name = "job", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct JobArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short = 'a', long = "fingerprint", default_value = "")]
    pub fingerprint: String,
    #[arg(short = 'f', long = "farmer-key", default_value = "")]
    pub farmer_key: String,
    #[arg(short = 'p', long = "pool-key", default_value = "")]
    pub pool_key: String,
    /// Memory budget in MiB
    #[arg(short = 'b', long = "ram", default_value_t = 3390)]
    pub ram_mib: u32,
    #[arg(short = 'r', long = "threads", default_value_t = 2)]
    pub threads: u32,
    #[arg(short = 't', long = "temp")]
    pub temp_dir: PathBuf,
    #[arg(short = 'd', long = "dest")]
    pub dest_dir: PathBuf,
    /// Plots per session, 0 for no limit
    #[arg(short = 'n', long = "count", default_value_t = 0)]
    pub plots_to_finish: u32,
    #[arg(long = "manage-self")]
    pub manage_self: bool,
}

impl JobArgs {
    pub fn into_descriptor(self, default_name: String) -> JobDescriptor {
        JobDescriptor {
            name: self.name.unwrap_or(default_name),
            key: KeySource {
                fingerprint: self.fingerprint,
                farmer_key: self.farmer_key,
                pool_key: self.pool_key,
            },
            ram_mib: self.ram_mib,
            threads: self.threads,
            temp_dir: self.temp_dir,
            dest_dir: self.dest_dir,
            plots_to_finish: self.plots_to_finish,
            manage_self: self.manage_self,
        }
    }
}

pub fn parse_job_line(line: &str, default_name: String) -> Result<JobDescriptor, String> {
    let tokens = shell_words::split(line).map_err(|err| err.to_string())?;
    let parsed = JobArgs::try_parse_from(tokens).map_err(|err| err.to_string())?;
    Ok(parsed.into_descriptor(default_name))
}

pub fn load_jobs(path: &Path) -> Result<Vec<JobDescriptor>, PlotterError> {
    let lines = read_job_lines(path)?;
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            parse_job_line(&line.text, format!("job-{}", idx + 1)).map_err(|message| {
                PlotterError::InvalidCommand {
                    message: format!("{}:{}: {}", path.display(), line.line_no, message.trim()),
                }
            })
        })
        .collect()
}

/// Starts a supervisor for every descriptor, in file order.
pub fn spawn_jobs(
    descriptors: Vec<JobDescriptor>,
    config: &PlotterConfig,
    refresh: Option<RefreshFn>,
) -> Result<JobList, PlotterError> {
    let jobs = descriptors
        .into_iter()
        .enumerate()
        .map(|(id, descriptor)| Job::spawn(id, descriptor, config.clone(), refresh.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(RwLock::new(jobs)))
}
