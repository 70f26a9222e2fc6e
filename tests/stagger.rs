#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use common::{config, descriptor, fake_plotter, quote, wait_until};
use plotherd::cli::spawn_jobs;
use plotherd::core::config::StaggerConfig;
use plotherd::core::job::JobDescriptor;
use plotherd::core::scheduler::{JobList, Scheduler};
use plotherd::core::supervisor::Job;

const WAIT: Duration = Duration::from_secs(20);
const TICK: Duration = Duration::from_millis(300);

fn stagger(static_delay: Duration, phase_one_limit: u32, other_limit: u32) -> StaggerConfig {
    StaggerConfig {
        static_delay,
        phase_one_limit,
        other_limit,
    }
}

fn jobs(exe: &str, root: &Path, descriptors: Vec<JobDescriptor>) -> JobList {
    spawn_jobs(descriptors, &config(exe.to_string(), root), None).unwrap()
}

fn running(jobs: &JobList) -> usize {
    jobs.read().unwrap().iter().filter(|job| job.is_running()).count()
}

fn stop_everything(jobs: &JobList) {
    for job in jobs.read().unwrap().iter() {
        job.stop(true).unwrap();
    }
}

#[test]
fn phase_one_ceiling_holds_back_admissions() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("echo 'Starting phase 1/4'; sleep 1; echo 'Starting phase 2/4'; exec sleep 30");
    let list = jobs(
        &exe,
        root.path(),
        (0..3).map(|idx| descriptor(&format!("job{idx}"), root.path(), 1)).collect(),
    );
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 1, 0), Arc::clone(&list));

    scheduler.start_all(TICK);
    assert!(wait_until(WAIT, || running(&list) == 1));
    thread::sleep(Duration::from_millis(600));
    assert_eq!(running(&list), 1);

    // Each job leaves phase 1 after a second, letting the next one in.
    assert!(wait_until(WAIT, || running(&list) == 3));
    let in_phase_one = list
        .read()
        .unwrap()
        .iter()
        .filter(|job| job.read(|snapshot| snapshot.state.phase == 1))
        .count();
    assert!(in_phase_one <= 1);

    scheduler.stop_all();
    stop_everything(&list);
}

#[test]
fn zero_ceilings_admit_every_job() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("echo 'Starting phase 1/4'; exec sleep 30");
    let list = jobs(
        &exe,
        root.path(),
        (0..3).map(|idx| descriptor(&format!("job{idx}"), root.path(), 1)).collect(),
    );
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 0, 0), Arc::clone(&list));

    scheduler.start_all(Duration::from_millis(100));
    assert!(wait_until(WAIT, || running(&list) == 3));
    assert!(scheduler.is_staggering());

    scheduler.stop_all();
    assert!(!scheduler.is_staggering());
    assert!(wait_until(WAIT, || running(&list) == 0));
}

#[test]
fn self_managed_and_finished_jobs_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("echo \"ID: p$$\"; echo 'Total time = 1 seconds'");
    let mut manual = descriptor("manual", root.path(), 0);
    manual.manage_self = true;
    let list = jobs(&exe, root.path(), vec![manual, descriptor("once", root.path(), 1)]);
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 0, 0), Arc::clone(&list));

    scheduler.start_all(Duration::from_millis(100));
    let (manual, once) = {
        let jobs = list.read().unwrap();
        (jobs[0].clone(), jobs[1].clone())
    };
    assert!(wait_until(WAIT, || once.read(|s| s.stats.plots_done == 1)));

    thread::sleep(Duration::from_millis(800));
    assert_eq!(once.stats().plots_done, 1);
    assert!(!once.is_running());
    assert_eq!(manual.stats().plots_done, 0);
    assert!(!manual.is_running());

    scheduler.cancel();
}

#[test]
fn static_delay_holds_the_first_start() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("exec sleep 30");
    let list = jobs(&exe, root.path(), vec![descriptor("late", root.path(), 1)]);
    let mut scheduler = Scheduler::new(
        stagger(Duration::from_millis(1500), 0, 0),
        Arc::clone(&list),
    );

    scheduler.start_all(Duration::from_millis(100));
    thread::sleep(Duration::from_millis(500));
    assert_eq!(running(&list), 0);
    assert!(scheduler.is_staggering());

    assert!(wait_until(WAIT, || running(&list) == 1));
    scheduler.stop_all();
    assert!(wait_until(WAIT, || running(&list) == 0));
}

#[test]
fn cancel_during_delay_starts_nothing() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("exec sleep 30");
    let list = jobs(&exe, root.path(), vec![descriptor("never", root.path(), 1)]);
    let mut scheduler = Scheduler::new(stagger(Duration::from_secs(60), 0, 0), Arc::clone(&list));

    scheduler.start_all(TICK);
    scheduler.cancel();
    assert!(!scheduler.is_staggering());
    thread::sleep(Duration::from_millis(300));
    assert_eq!(running(&list), 0);
}

#[test]
fn launch_failure_does_not_halt_other_jobs() {
    let root = tempfile::tempdir().unwrap();
    let broken = Job::spawn(
        0,
        descriptor("broken", root.path(), 1),
        config("/definitely/not/a/plotter".to_string(), root.path()),
        None,
    )
    .unwrap();
    let healthy = Job::spawn(
        1,
        descriptor("healthy", root.path(), 1),
        config(fake_plotter("exec sleep 30"), root.path()),
        None,
    )
    .unwrap();
    let list: JobList = Arc::new(RwLock::new(vec![broken.clone(), healthy.clone()]));
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 0, 0), Arc::clone(&list));

    scheduler.start_all(Duration::from_millis(100));
    assert!(wait_until(WAIT, || healthy.is_running()));
    assert!(!broken.is_running());
    assert!(scheduler.is_staggering());

    scheduler.stop_all();
    assert!(wait_until(WAIT, || !healthy.is_running()));
}

#[test]
fn stopped_run_is_readmitted_without_exceeding_target() {
    let root = tempfile::tempdir().unwrap();
    let counter = root.path().join("runs");
    // The second run hangs so it can be stopped mid-session; every other run completes.
    let exe = fake_plotter(&format!(
        "n=$(cat {runs} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {runs}; \
         echo \"ID: p$$\"; \
         if [ $n -eq 2 ]; then exec sleep 30; fi; \
         echo 'Total time = 1 seconds'",
        runs = quote(&counter)
    ));
    let list = jobs(&exe, root.path(), vec![descriptor("pair", root.path(), 2)]);
    let job = list.read().unwrap()[0].clone();
    let runs = || {
        std::fs::read_to_string(&counter)
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 0, 0), Arc::clone(&list));

    scheduler.start_all(Duration::from_millis(100));
    assert!(wait_until(WAIT, || runs() == 2 && job.read(|s| !s.state.plot_id.is_empty())));
    assert_eq!(job.read(|s| s.session_done), 1);

    job.stop(true).unwrap();
    assert!(wait_until(WAIT, || job.read(|s| s.stats.plots_done == 2 && s.state.is_ready())));

    thread::sleep(Duration::from_millis(800));
    let snapshot = job.snapshot();
    assert_eq!(snapshot.stats.plots_done, 2);
    assert_eq!(snapshot.session_done, 2);
    assert_eq!(runs(), 3);
    assert!(!snapshot.state.running);

    scheduler.cancel();
}

#[test]
fn new_session_resets_completed_count() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("echo \"ID: p$$\"; echo 'Total time = 1 seconds'");
    let list = jobs(&exe, root.path(), vec![descriptor("again", root.path(), 1)]);
    let job = list.read().unwrap()[0].clone();
    let mut scheduler = Scheduler::new(stagger(Duration::ZERO, 0, 0), Arc::clone(&list));

    scheduler.start_all(Duration::from_millis(100));
    assert!(wait_until(WAIT, || job.read(|s| s.stats.plots_done == 1 && s.state.is_ready())));

    scheduler.start_all(Duration::from_millis(100));
    assert!(wait_until(WAIT, || job.read(|s| s.stats.plots_done == 2 && s.state.is_ready())));
    thread::sleep(Duration::from_millis(500));
    assert_eq!(job.stats().plots_done, 2);
    assert_eq!(job.read(|s| s.session_done), 1);

    scheduler.cancel();
}

#[test]
fn restarting_discards_pending_delay() {
    let root = tempfile::tempdir().unwrap();
    let exe = fake_plotter("exec sleep 30");
    let list = jobs(&exe, root.path(), vec![descriptor("prompt", root.path(), 1)]);
    let mut scheduler = Scheduler::new(stagger(Duration::from_secs(60), 0, 0), Arc::clone(&list));

    scheduler.start_all(TICK);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(running(&list), 0);

    scheduler.set_config(stagger(Duration::ZERO, 0, 0));
    scheduler.start_all(TICK);
    assert!(wait_until(Duration::from_secs(5), || running(&list) == 1));
    assert!(scheduler.is_staggering());

    scheduler.stop_all();
    assert!(wait_until(WAIT, || running(&list) == 0));
}
