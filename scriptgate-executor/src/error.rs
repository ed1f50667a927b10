//! Error types for the executor crate.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Errors that can occur while running an external script.
///
/// Variants that carry `output` hold whatever the child wrote before the
/// failure. That output is diagnostic material for the server log and must
/// not be relayed to HTTP callers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The process could not be started.
    #[error("failed to spawn {}: {source}", .program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process ran to completion but reported failure.
    #[error("script exited unsuccessfully ({status})")]
    NonZeroExit { status: ExitStatus, output: Vec<u8> },

    /// The deadline elapsed and the process was killed.
    #[error("script killed after exceeding {}s deadline", .after.as_secs_f64())]
    TimedOut { after: Duration, output: Vec<u8> },

    /// Reading output or reaping the process failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Output captured before the failure, if any.
    #[must_use]
    pub fn captured_output(&self) -> &[u8] {
        match self {
            Self::NonZeroExit { output, .. } | Self::TimedOut { output, .. } => output,
            Self::SpawnFailed { .. } | Self::Io(_) => &[],
        }
    }
}
