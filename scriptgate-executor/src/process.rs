//! Local process backend.
//!
//! Runs scripts as direct children of the gateway via
//! `tokio::process::Command`. Each child is placed in its own process group
//! so that a deadline or a dropped request takes down anything the script
//! started, not just the script itself.

use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::backend::ScriptBackend;
use crate::{ExecutorError, Invocation, InvocationOutput};

const READ_CHUNK: usize = 8 * 1024;

/// Spawn attempts made while exec reports the script file as busy.
const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Runs invocations as local child processes.
///
/// # Cancel Safety
/// Cancel safe. Dropping the future kills the child via `kill_on_drop` and
/// signals its process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptBackend for ProcessBackend {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationOutput, ExecutorError> {
        let started_at = Utc::now();
        let wall_start = Instant::now();

        tracing::debug!(
            invocation = %invocation.id,
            program = %invocation.program.display(),
            args = invocation.args.len(),
            "spawning script"
        );

        let mut child = spawn(invocation).await?;
        // Declared after `child` so it drops first, while the child is
        // still unreaped and its pid still names the group.
        let mut group = GroupKill::arm(&child);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not piped"))?;

        let mut capture = Capture::default();
        let run = async {
            capture.drain(stdout, stderr).await?;
            child.wait().await
        };

        let status = match invocation.deadline {
            None => run.await?,
            Some(deadline) => {
                let outcome = tokio::time::timeout(deadline, run).await;
                if let Ok(status) = outcome {
                    status?
                } else {
                    group.kill_now();
                    terminate(&mut child).await;
                    tracing::warn!(
                        invocation = %invocation.id,
                        program = %invocation.program.display(),
                        deadline_s = deadline.as_secs_f64(),
                        "script exceeded deadline and was killed"
                    );
                    return Err(ExecutorError::TimedOut {
                        after: deadline,
                        output: capture.combined,
                    });
                }
            }
        };
        group.disarm();

        let duration = wall_start.elapsed();
        let Capture { combined, stdout } = capture;

        if !status.success() {
            return Err(ExecutorError::NonZeroExit { status, output: combined });
        }

        tracing::info!(
            invocation = %invocation.id,
            program = %invocation.program.display(),
            %status,
            started_at = %started_at.to_rfc3339(),
            bytes = combined.len(),
            elapsed_ms = duration.as_millis(),
            "script completed"
        );

        Ok(InvocationOutput { combined, stdout, status, started_at, duration })
    }
}

/// Spawn the child, retrying while the script file is still open for
/// writing in another process (`ETXTBSY`), as happens right after a script
/// is installed.
async fn spawn(invocation: &Invocation) -> Result<Child, ExecutorError> {
    let mut attempt = 1;
    loop {
        match build_command(invocation).spawn() {
            Ok(child) => return Ok(child),
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                tracing::debug!(
                    invocation = %invocation.id,
                    program = %invocation.program.display(),
                    attempt,
                    "script file busy; retrying spawn"
                );
                attempt += 1;
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            }
            Err(source) => {
                return Err(ExecutorError::SpawnFailed {
                    program: invocation.program.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(unix)]
fn is_text_busy(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_e: &io::Error) -> bool {
    false
}

fn build_command(invocation: &Invocation) -> Command {
    let mut std_command = std::process::Command::new(&invocation.program);
    std_command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &invocation.working_dir {
        std_command.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }

    let mut command = Command::from(std_command);
    command.kill_on_drop(true);
    command
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill after deadline failed");
    }
}

/// Output collected from both pipes.
#[derive(Debug, Default)]
struct Capture {
    combined: Vec<u8>,
    stdout: Vec<u8>,
}

impl Capture {
    /// Read both pipes to EOF, appending chunks to `combined` in arrival
    /// order.
    async fn drain(&mut self, mut stdout: ChildStdout, mut stderr: ChildStderr) -> io::Result<()> {
        let mut out_buf = [0u8; READ_CHUNK];
        let mut err_buf = [0u8; READ_CHUNK];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                read = stdout.read(&mut out_buf), if out_open => {
                    let n = read?;
                    if n == 0 {
                        out_open = false;
                    } else {
                        self.combined.extend_from_slice(&out_buf[..n]);
                        self.stdout.extend_from_slice(&out_buf[..n]);
                    }
                }
                read = stderr.read(&mut err_buf), if err_open => {
                    let n = read?;
                    if n == 0 {
                        err_open = false;
                    } else {
                        self.combined.extend_from_slice(&err_buf[..n]);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Kills the child's process group when dropped unless disarmed.
struct GroupKill {
    pgid: Option<i32>,
}

impl GroupKill {
    fn arm(child: &Child) -> Self {
        Self { pgid: child.id().and_then(|pid| i32::try_from(pid).ok()) }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill_now(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid);
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill_now();
    }
}

#[cfg(unix)]
fn signal_group(pgid: i32) {
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the
    // process group led by the child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %io::Error::last_os_error(), "process group kill failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: i32) {}
