#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use plotherd::core::config::{PlotterConfig, RetryPolicy};
use plotherd::core::job::{JobDescriptor, KeySource};

/// Plotter command line that runs `script` with `sh`, receiving the
/// plotting arguments as `$1..`.
pub fn fake_plotter(script: &str) -> String {
    shell_words::join(["sh", "-c", script, "plotter"])
}

pub fn config(exe: String, root: &Path) -> PlotterConfig {
    PlotterConfig {
        executable: exe,
        log_dir: root.join("logs"),
        cleanup: RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        },
        ..PlotterConfig::default()
    }
}

pub fn descriptor(name: &str, temp_dir: &Path, plots_to_finish: u32) -> JobDescriptor {
    JobDescriptor {
        name: name.to_string(),
        key: KeySource::fingerprint("abc123"),
        ram_mib: 4500,
        threads: 4,
        temp_dir: temp_dir.to_path_buf(),
        dest_dir: temp_dir.join("dest"),
        plots_to_finish,
        manage_self: false,
    }
}

pub fn quote(path: &Path) -> String {
    shell_words::quote(&path.display().to_string()).into_owned()
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    done()
}

pub fn temp_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().map_or(false, |ext| ext == "tmp"))
                .collect()
        })
        .unwrap_or_default()
}
