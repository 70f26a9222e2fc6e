use std::time::Duration;

use crate::core::job::{JobSnapshot, SupervisorStatus};
use crate::core::summary::PlotResult;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(format_duration)
            .unwrap_or_else(|_| "--:--:--".to_string()),
        None => "--:--:--".to_string(),
    }
}

pub fn format_status(status: SupervisorStatus) -> &'static str {
    match status {
        SupervisorStatus::Idle => "Idle",
        SupervisorStatus::Starting => "Starting",
        SupervisorStatus::Running => "Running",
        SupervisorStatus::Completing => "Completing",
    }
}

pub fn format_phase(phase: u8, sub_phase: &str) -> String {
    if phase == 0 {
        return "-".to_string();
    }
    if sub_phase.is_empty() {
        format!("{phase}/4")
    } else {
        format!("{phase}/4 ({sub_phase})")
    }
}

pub fn format_target(done: u32, target: u32) -> String {
    if target == 0 {
        format!("{done}/∞")
    } else {
        format!("{done}/{target}")
    }
}

pub fn short_id(plot_id: &str) -> &str {
    let end = plot_id
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(plot_id.len());
    &plot_id[..end]
}

pub fn format_result_line(result: &PlotResult) -> String {
    format!(
        "p1={} p2={} p3={} p4={} total={} copy={}",
        format_seconds(result.phase_one_time),
        format_seconds(result.phase_two_time),
        format_seconds(result.phase_three_time),
        format_seconds(result.phase_four_time),
        format_seconds(result.total_time),
        format_seconds(result.copy_time),
    )
}

pub fn format_job_line(index: usize, snapshot: &JobSnapshot) -> String {
    let state = &snapshot.state;
    let plot_id = if state.plot_id.is_empty() {
        "-"
    } else {
        short_id(&state.plot_id)
    };
    let last_total = snapshot.stats.last_result().and_then(|result| result.total_time);
    format!(
        "[{index}] {name:<16} {status:<10} phase={phase:<14} plot={plot_id:<8} done={done} last={last}{managed}",
        name = snapshot.descriptor.name,
        status = format_status(state.status),
        phase = format_phase(state.phase, &state.sub_phase),
        done = format_target(snapshot.session_done, snapshot.descriptor.plots_to_finish),
        last = format_seconds(last_total),
        managed = if snapshot.descriptor.manage_self { " (self-managed)" } else { "" },
    )
}
