//! Invocation descriptor and result types.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scriptgate_core::InvocationId;

/// Hard upper bound on a script-backed request's runtime.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to launch one external process.
///
/// Arguments are handed to the program directly, never through a shell.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Invocation {
    /// Correlation id for log records.
    pub id: InvocationId,
    /// Executable to run.
    pub program: PathBuf,
    /// Positional arguments, in order.
    pub args: Vec<String>,
    /// Working directory of the child; inherited when `None`.
    pub working_dir: Option<PathBuf>,
    /// Wall-clock limit; the child is killed once it elapses.
    pub deadline: Option<Duration>,
}

impl Invocation {
    /// Describe a run of `program` with no arguments and no deadline.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            id: InvocationId::new(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Output of a process that exited successfully.
#[derive(Debug, Clone)]
pub struct InvocationOutput {
    /// stdout and stderr interleaved in the order they were read.
    pub combined: Vec<u8>,
    /// stdout alone.
    pub stdout: Vec<u8>,
    /// Exit status of the child.
    pub status: ExitStatus,
    /// When the process was spawned.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
}

impl InvocationOutput {
    /// Combined output as text; invalid UTF-8 is replaced.
    #[must_use]
    pub fn combined_lossy(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }

    /// stdout as text; invalid UTF-8 is replaced.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}
