use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::ParseWarning;

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    PlotIdAssigned(String),
    PhaseStarted(u8),
    SubPhaseUpdate(String),
    PhaseTimed { phase: u8, seconds: f64 },
    TotalTimed(f64),
    CopyTimed(f64),
    Unrecognized,
}

const PLOT_ID_MARKER: &str = "ID: ";
const PHASE_START_MARKER: &str = "Starting phase";
const TABLES_MARKER: &str = "tables ";
const TABLE_MARKER: &str = "table ";
const PHASE_TIME_MARKER: &str = "Time for phase";
const TOTAL_TIME_MARKER: &str = "Total time";
const COPY_TIME_MARKER: &str = "Copy time";

static RE_PHASE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Starting phase (\d+)/\d+").unwrap());
static RE_PHASE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Time for phase (\d+) = ([0-9]*\.?[0-9]+) seconds").unwrap());
static RE_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\s*([0-9]*\.?[0-9]+)\s*seconds").unwrap());

/// Classifies one output line against the known plotter vocabulary.
///
/// Matching is case-sensitive substring search, checked in a fixed order:
/// plot id, phase start, table progress, phase time, total time, copy time.
/// Lines outside the vocabulary are `Ok(LineEvent::Unrecognized)`. A line
/// that carries a marker but whose payload cannot be read is an `Err`; the
/// caller treats it as unrecognized and keeps going.
pub fn classify(line: &str) -> Result<LineEvent, ParseWarning> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);

    if let Some(pos) = line.rfind(PLOT_ID_MARKER) {
        let id = line[pos + PLOT_ID_MARKER.len()..].trim();
        if id.is_empty() {
            return Err(warning(line, "empty plot id"));
        }
        return Ok(LineEvent::PlotIdAssigned(id.to_string()));
    }

    if line.contains(PHASE_START_MARKER) {
        let phase = RE_PHASE_START
            .captures(line)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .ok_or_else(|| warning(line, "missing phase number"))?;
        if !(1..=4).contains(&phase) {
            return Err(warning(line, "phase out of range"));
        }
        return Ok(LineEvent::PhaseStarted(phase));
    }

    if let Some(label) = after_last(line, TABLES_MARKER).or_else(|| after_last(line, TABLE_MARKER)) {
        return Ok(LineEvent::SubPhaseUpdate(label.to_string()));
    }

    if line.contains(PHASE_TIME_MARKER) {
        let (phase, seconds) = RE_PHASE_TIME
            .captures(line)
            .and_then(|cap| {
                let phase = cap.get(1)?.as_str().parse::<u8>().ok()?;
                let seconds = cap.get(2)?.as_str().parse::<f64>().ok()?;
                Some((phase, seconds))
            })
            .ok_or_else(|| warning(line, "malformed phase time"))?;
        if !(1..=4).contains(&phase) {
            return Err(warning(line, "phase out of range"));
        }
        return Ok(LineEvent::PhaseTimed { phase, seconds });
    }

    if line.contains(TOTAL_TIME_MARKER) {
        return parse_seconds(line).map(LineEvent::TotalTimed);
    }

    if line.contains(COPY_TIME_MARKER) {
        return parse_seconds(line).map(LineEvent::CopyTimed);
    }

    Ok(LineEvent::Unrecognized)
}

fn after_last<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.rfind(marker)
        .map(|pos| line[pos + marker.len()..].trim())
}

fn parse_seconds(line: &str) -> Result<f64, ParseWarning> {
    RE_SECONDS
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| warning(line, "missing seconds"))
}

fn warning(line: &str, reason: &str) -> ParseWarning {
    ParseWarning {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}
