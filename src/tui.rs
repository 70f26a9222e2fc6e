use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;

use plotherd::cli::{self, RunArgs};
use plotherd::core::cleanup::clear_orphans;
use plotherd::core::config::PlotterConfig;
use plotherd::core::error::PlotterError;
use plotherd::core::formatter::{format_job_line, format_result_line};
use plotherd::core::job::JobDescriptor;
use plotherd::core::scheduler::{JobList, PhaseCounts, Scheduler};
use plotherd::core::supervisor::{Job, RefreshFn, StartOutcome};

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, PlotterError> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

const INPUT_POLL: Duration = Duration::from_millis(50);
const IDLE_REDRAW: Duration = Duration::from_secs(1);

/// Redraws when a job reported a change or input arrived, and at least once
/// per idle interval so the scheduler state stays current.
struct RedrawGate {
    idle: Duration,
    pending: bool,
    last: Option<Instant>,
}

impl RedrawGate {
    fn new(idle: Duration) -> Self {
        Self {
            idle,
            pending: true,
            last: None,
        }
    }

    fn mark(&mut self) {
        self.pending = true;
    }

    fn due(&self, now: Instant) -> bool {
        self.pending
            || self
                .last
                .map_or(true, |last| now.duration_since(last) >= self.idle)
    }

    fn drawn(&mut self, now: Instant) {
        self.pending = false;
        self.last = Some(now);
    }
}

struct AppState {
    jobs: JobList,
    scheduler: Scheduler,
    config: PlotterConfig,
    tick: Duration,
    selected: usize,
    history: Vec<String>,
    log_scroll: usize,
    should_quit: bool,
}

impl AppState {
    fn push_history(&mut self, line: impl Into<String>) {
        const MAX_LINES: usize = 200;
        if self.history.len() >= MAX_LINES {
            let drain_count = self.history.len().saturating_sub(MAX_LINES - 1);
            self.history.drain(0..drain_count);
        }
        self.history.push(line.into());
    }

    fn job_list(&self) -> Vec<Job> {
        self.jobs
            .read()
            .map(|jobs| jobs.clone())
            .unwrap_or_default()
    }

    fn selected_job(&self) -> Option<Job> {
        self.job_list().get(self.selected).cloned()
    }

    fn select(&mut self, delta: isize) {
        let count = self.job_list().len();
        if count == 0 {
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, count as isize - 1);
        self.selected = next as usize;
        self.log_scroll = 0;
    }

    fn toggle_selected(&mut self) {
        let Some(job) = self.selected_job() else {
            return;
        };
        let name = job.read(|snapshot| snapshot.descriptor.name.clone());
        if job.is_running() {
            match job.stop(false) {
                Ok(()) => self.push_history(format!("Stopped {name}.")),
                Err(err) => self.push_history(format!("error: {err}")),
            }
            return;
        }
        match job.start() {
            Ok(StartOutcome::Started) => self.push_history(format!("Started {name}.")),
            Ok(StartOutcome::AlreadyRunning) => self.push_history(format!("{name} is already running.")),
            Err(err) => self.push_history(format!("error: {err}")),
        }
    }

    fn start_all(&mut self) {
        self.scheduler.start_all(self.tick);
        self.push_history("Staggering started.");
    }

    fn stop_all(&mut self) {
        self.scheduler.stop_all();
        self.push_history("Stopped all jobs.");
    }

    fn clear_temp(&mut self) {
        let jobs = self.job_list();
        let dirs: Vec<_> = jobs
            .iter()
            .map(|job| job.read(|snapshot| snapshot.descriptor.temp_dir.clone()))
            .collect();
        let active: Vec<String> = jobs
            .iter()
            .map(|job| job.read(|snapshot| snapshot.state.plot_id.clone()))
            .filter(|id| !id.is_empty())
            .collect();
        let pending = clear_orphans(&dirs, &active, self.config.cleanup);
        self.push_history(format!("Deleting {} orphaned temp files.", pending.len()));
    }
}

pub fn run(
    descriptors: Vec<JobDescriptor>,
    config: &PlotterConfig,
    args: &RunArgs,
) -> Result<(), PlotterError> {
    let (refresh_tx, refresh_rx) = mpsc::channel::<usize>();
    let refresh_tx = std::sync::Mutex::new(refresh_tx);
    let refresh: RefreshFn = Arc::new(move |job_id: usize| {
        if let Ok(tx) = refresh_tx.lock() {
            let _ = tx.send(job_id);
        }
    });

    let jobs = cli::spawn_jobs(descriptors, config, Some(refresh))?;
    let scheduler = Scheduler::new(args.stagger_config(), Arc::clone(&jobs));

    let mut app = AppState {
        jobs,
        scheduler,
        config: config.clone(),
        tick: args.tick(),
        selected: 0,
        history: vec!["Welcome to plotherd. s: start all, x: stop all, Enter: start/stop job, c: clean temp, q: quit".to_string()],
        log_scroll: 0,
        should_quit: false,
    };
    if args.start {
        app.start_all();
    }

    let _guard = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut redraw = RedrawGate::new(IDLE_REDRAW);

    loop {
        if refresh_rx.try_iter().count() > 0 {
            redraw.mark();
        }

        let now = Instant::now();
        if redraw.due(now) {
            draw(&mut terminal, &app)?;
            redraw.drawn(now);
        }

        if event::poll(INPUT_POLL)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                    KeyCode::Char('s') => app.start_all(),
                    KeyCode::Char('x') => app.stop_all(),
                    KeyCode::Char('c') => app.clear_temp(),
                    KeyCode::Enter => app.toggle_selected(),
                    KeyCode::Up => app.select(-1),
                    KeyCode::Down => app.select(1),
                    KeyCode::PageUp => app.log_scroll = app.log_scroll.saturating_add(10),
                    KeyCode::PageDown => app.log_scroll = app.log_scroll.saturating_sub(10),
                    KeyCode::End => app.log_scroll = 0,
                    _ => {}
                }
            }
            redraw.mark();
        }

        if app.should_quit {
            break;
        }
    }

    app.scheduler.cancel();
    for job in app.job_list() {
        let _ = job.stop(true);
    }
    Ok(())
}

fn draw(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &AppState) -> Result<(), PlotterError> {
    let jobs = app.job_list();
    let snapshots: Vec<_> = jobs.iter().map(Job::snapshot).collect();
    let counts = PhaseCounts::tally(snapshots.iter().map(|snapshot| &snapshot.state));

    terminal.draw(|frame| {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length((snapshots.len() as u16).saturating_add(2).max(3)),
                Constraint::Min(5),
                Constraint::Length(6),
            ])
            .split(frame.size());

        let stagger = if app.scheduler.is_staggering() { "staggering" } else { "idle" };
        let header = Paragraph::new(Line::from(vec![
            Span::raw(format!("Scheduler: {stagger}  ")),
            Span::raw(format!("phase 1: {}  other: {}", counts.phase_one, counts.other)),
        ]))
        .block(Block::default().title("plotherd").borders(Borders::ALL));
        frame.render_widget(header, layout[0]);

        let rows: Vec<Line> = snapshots
            .iter()
            .enumerate()
            .map(|(idx, snapshot)| {
                let text = format_job_line(idx, snapshot);
                if idx == app.selected {
                    Line::from(Span::styled(text, Style::default().add_modifier(Modifier::REVERSED)))
                } else {
                    Line::from(text)
                }
            })
            .collect();
        frame.render_widget(
            Paragraph::new(rows).block(Block::default().title("Jobs").borders(Borders::ALL)),
            layout[1],
        );

        let log_height = layout[2].height.saturating_sub(2).max(1) as usize;
        let (log_title, log_lines) = match snapshots.get(app.selected) {
            Some(snapshot) => {
                let mut lines: Vec<String> = snapshot
                    .stats
                    .results
                    .iter()
                    .enumerate()
                    .map(|(idx, result)| format!("plot {}: {}", idx + 1, format_result_line(result)))
                    .collect();
                lines.extend(snapshot.state.logs.iter().cloned());
                (format!("Logs: {}", snapshot.descriptor.name), lines)
            }
            None => ("Logs".to_string(), Vec::new()),
        };
        let end = log_lines.len().saturating_sub(app.log_scroll);
        let start = end.saturating_sub(log_height);
        let visible: Vec<Line> = log_lines[start..end].iter().map(|line| Line::from(line.clone())).collect();
        frame.render_widget(
            Paragraph::new(visible)
                .block(Block::default().title(log_title).borders(Borders::ALL))
                .wrap(Wrap { trim: false }),
            layout[2],
        );

        let history_height = layout[3].height.saturating_sub(2) as usize;
        let history_start = app.history.len().saturating_sub(history_height);
        let history: Vec<Line> = app.history[history_start..]
            .iter()
            .map(|line| Line::from(line.clone()))
            .collect();
        frame.render_widget(
            Paragraph::new(history)
                .block(Block::default().title("Session").borders(Borders::ALL))
                .wrap(Wrap { trim: true }),
            layout[3],
        );
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_always_drawn() {
        let gate = RedrawGate::new(Duration::from_secs(60));
        assert!(gate.due(Instant::now()));
    }

    #[test]
    fn quiet_jobs_wait_for_idle_interval() {
        let mut gate = RedrawGate::new(Duration::from_secs(1));
        let start = Instant::now();
        gate.drawn(start);

        assert!(!gate.due(start + Duration::from_millis(500)));
        assert!(gate.due(start + Duration::from_secs(1)));
    }

    #[test]
    fn refresh_forces_next_frame() {
        let mut gate = RedrawGate::new(Duration::from_secs(60));
        let start = Instant::now();
        gate.drawn(start);
        assert!(!gate.due(start));

        gate.mark();
        assert!(gate.due(start));
        gate.drawn(start);
        assert!(!gate.due(start));
    }
}
