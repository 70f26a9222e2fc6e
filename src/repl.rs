use std::io::{self, BufRead, Write};
use std::sync::Arc;

use plotherd::cli::{self, RunArgs};
use plotherd::core::cleanup::clear_orphans;
use plotherd::core::config::PlotterConfig;
use plotherd::core::error::PlotterError;
use plotherd::core::formatter::{format_job_line, format_result_line};
use plotherd::core::job::JobDescriptor;
use plotherd::core::scheduler::{JobList, Scheduler};
use plotherd::core::supervisor::{Job, StartOutcome};

const HELP: &str = "\
Commands:
  status            list jobs
  start <n>         start job n
  stop <n>          stop job n (waits for temp cleanup)
  logs <n>          show results and recent output of job n
  startall          start staggering
  stopall           stop staggering and every job
  clean             delete temp files of no running plot
  quit";

pub fn run(
    descriptors: Vec<JobDescriptor>,
    config: &PlotterConfig,
    args: &RunArgs,
) -> Result<(), PlotterError> {
    let jobs = cli::spawn_jobs(descriptors, config, None)?;
    let mut scheduler = Scheduler::new(args.stagger_config(), Arc::clone(&jobs));
    if args.start {
        scheduler.start_all(args.tick());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        print!("plotherd> ");
        stdout.flush()?;

        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let index = words.next().and_then(|word| word.parse::<usize>().ok());

        match (command, index) {
            ("quit" | "exit", _) => break,
            ("help", _) => println!("{HELP}"),
            ("status", _) => {
                for (idx, job) in job_list(&jobs).iter().enumerate() {
                    println!("{}", job.read(|snapshot| format_job_line(idx, snapshot)));
                }
                let state = if scheduler.is_staggering() { "staggering" } else { "idle" };
                println!("scheduler: {state}");
            }
            ("start", Some(n)) => match job_at(&jobs, n).map(|job| job.start()) {
                Some(Ok(StartOutcome::Started)) => println!("started job {n}"),
                Some(Ok(StartOutcome::AlreadyRunning)) => println!("job {n} is already running"),
                Some(Err(err)) => eprintln!("error: {err}"),
                None => eprintln!("no job {n}"),
            },
            ("stop", Some(n)) => match job_at(&jobs, n).map(|job| job.stop(true)) {
                Some(Ok(())) => println!("stopped job {n}"),
                Some(Err(err)) => eprintln!("error: {err}"),
                None => eprintln!("no job {n}"),
            },
            ("logs", Some(n)) => match job_at(&jobs, n) {
                Some(job) => job.read(|snapshot| {
                    for (idx, result) in snapshot.stats.results.iter().enumerate() {
                        println!("plot {}: {}", idx + 1, format_result_line(result));
                    }
                    let start = snapshot.state.logs.len().saturating_sub(20);
                    for log in &snapshot.state.logs[start..] {
                        println!("  {log}");
                    }
                }),
                None => eprintln!("no job {n}"),
            },
            ("startall", _) => {
                scheduler.start_all(args.tick());
                println!("staggering started");
            }
            ("stopall", _) => {
                scheduler.stop_all();
                println!("all jobs stopped");
            }
            ("clean", _) => {
                let list = job_list(&jobs);
                let dirs: Vec<_> = list
                    .iter()
                    .map(|job| job.read(|snapshot| snapshot.descriptor.temp_dir.clone()))
                    .collect();
                let active: Vec<String> = list
                    .iter()
                    .map(|job| job.read(|snapshot| snapshot.state.plot_id.clone()))
                    .filter(|id| !id.is_empty())
                    .collect();
                let report = clear_orphans(&dirs, &active, config.cleanup).wait();
                println!(
                    "deleted {} temp files, {} failed",
                    report.deleted.len(),
                    report.failed.len()
                );
            }
            _ => eprintln!("unknown command, try 'help'"),
        }
    }

    scheduler.cancel();
    for job in job_list(&jobs) {
        let _ = job.stop(true);
    }
    Ok(())
}

fn job_list(jobs: &JobList) -> Vec<Job> {
    jobs.read().map(|jobs| jobs.clone()).unwrap_or_default()
}

fn job_at(jobs: &JobList, index: usize) -> Option<Job> {
    job_list(jobs).get(index).cloned()
}
