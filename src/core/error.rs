use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlotterError {
    #[error("failed to launch plotter '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("job supervisor is no longer running")]
    SupervisorGone,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unparseable progress line ({reason}): {line}")]
pub struct ParseWarning {
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not delete {} after {attempts} attempts", path.display())]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub attempts: u32,
}
