use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::command::Executable;
use crate::core::error::PlotterError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Runs a short query to completion and returns its standard output lines.
///
/// Never fails: a launch error yields no lines, and on timeout the process is
/// killed and whatever it printed so far is returned. Standard error is
/// discarded and a timeout is indistinguishable from a short-lived run.
pub fn run_sync(executable: &Executable, args: &[&str], timeout: Duration) -> Vec<String> {
    let mut cmd = Command::new(&executable.program);
    cmd.args(&executable.prefix_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %executable.program, error = %err, "query could not be started");
            return Vec::new();
        }
    };

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Vec::new();
        }
    };

    let lines = Arc::new(Mutex::new(Vec::new()));
    let reader_lines = Arc::clone(&lines);
    let (done_tx, done_rx) = mpsc::channel::<()>();

    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Ok(mut buffer) = reader_lines.lock() {
                buffer.push(line);
            }
        }
        let _ = done_tx.send(());
    });

    match done_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            let _ = child.wait();
        }
        Err(RecvTimeoutError::Timeout) => {
            debug!(program = %executable.program, ?args, "query timed out, killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    let collected = lines.lock().map(|buffer| buffer.clone()).unwrap_or_default();
    collected
}

#[derive(Debug, Clone)]
pub struct ProcessHandle {
    child: Arc<Mutex<Child>>,
    pid: u32,
    started_at: Instant,
    log_path: PathBuf,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_alive(&self) -> bool {
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(err) = child.kill() {
                    warn!(pid = self.pid, error = %err, "failed to kill plotter");
                } else {
                    info!(pid = self.pid, "plotter killed");
                }
            }
        }
    }
}

/// Starts the plotter and streams its output.
///
/// Every stdout and stderr line is appended to a log file in `log_dir`
/// named after the start time and pid, then passed to `on_line`. Once both streams
/// are closed and the process has exited, `on_exit` runs exactly once with
/// the elapsed wall-clock seconds.
pub fn spawn<L, E>(
    executable: &Executable,
    args: &[String],
    log_dir: &Path,
    mut on_line: L,
    on_exit: E,
) -> Result<ProcessHandle, PlotterError>
where
    L: FnMut(String) + Send + 'static,
    E: FnOnce(f64) + Send + 'static,
{
    let mut cmd = Command::new(&executable.program);
    cmd.args(&executable.prefix_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started_at = Instant::now();
    let mut child = cmd.spawn().map_err(|source| PlotterError::Launch {
        program: executable.program.clone(),
        source,
    })?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let log_path = log_dir.join(log_file_name(pid));
    let mut log_file = open_log(log_dir, &log_path);

    info!(pid, program = %executable.program, log = %log_path.display(), "plotter started");

    let (line_tx, line_rx) = mpsc::channel::<(StreamKind, String)>();
    let mut readers = Vec::new();
    if let Some(stdout) = stdout {
        readers.push(spawn_line_reader(StreamKind::Stdout, stdout, line_tx.clone()));
    }
    if let Some(stderr) = stderr {
        readers.push(spawn_line_reader(StreamKind::Stderr, stderr, line_tx.clone()));
    }
    drop(line_tx);

    let child = Arc::new(Mutex::new(child));
    let waiter = Arc::clone(&child);

    thread::spawn(move || {
        for (stream, line) in line_rx {
            if let Some(file) = log_file.as_mut() {
                if let Err(err) = writeln!(file, "{line}") {
                    warn!(pid, error = %err, "plot log write failed, disabling log");
                    log_file = None;
                }
            }
            debug!(pid, ?stream, "{line}");
            on_line(line);
        }

        for reader in readers {
            let _ = reader.join();
        }

        loop {
            let exited = match waiter.lock() {
                Ok(mut child) => !matches!(child.try_wait(), Ok(None)),
                Err(_) => true,
            };
            if exited {
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        let elapsed = started_at.elapsed().as_secs_f64();
        info!(pid, elapsed, "plotter exited");
        on_exit(elapsed);
    });

    Ok(ProcessHandle {
        child,
        pid,
        started_at,
        log_path,
    })
}

fn log_file_name(pid: u32) -> String {
    format!("{}-{pid}.log", chrono::Local::now().format("%Y-%m-%dT%H-%M-%S%.3f"))
}

fn open_log(log_dir: &Path, log_path: &Path) -> Option<File> {
    let opened = fs::create_dir_all(log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
    });
    match opened {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(path = %log_path.display(), error = %err, "could not open plot log");
            None
        }
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: StreamKind,
    reader: R,
    sender: Sender<(StreamKind, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line_buf: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match reader.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            match byte[0] {
                b'\r' | b'\n' => {
                    if line_buf.is_empty() {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&line_buf).trim_end().to_string();
                    line_buf.clear();
                    if !line.is_empty() && sender.send((stream, line)).is_err() {
                        break;
                    }
                }
                other => line_buf.push(other),
            }
        }

        if !line_buf.is_empty() {
            let line = String::from_utf8_lossy(&line_buf).trim_end().to_string();
            if !line.is_empty() {
                let _ = sender.send((stream, line));
            }
        }
    })
}
