//! Script backend abstraction trait.
//!
//! Lets the gateway apply its request-safety logic once while the thing
//! that actually runs a script can be swapped out, e.g. for a recording
//! backend in tests.

use async_trait::async_trait;

use crate::{ExecutorError, Invocation, InvocationOutput};

/// Runs an [`Invocation`] to completion.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Cancel Safety
/// Implementations must be cancel safe: dropping the future must not leave
/// a child process running.
#[async_trait]
pub trait ScriptBackend: Send + Sync {
    /// Run the described process and collect its output.
    ///
    /// # Errors
    /// Returns [`ExecutorError::SpawnFailed`] if the process cannot start,
    /// [`ExecutorError::NonZeroExit`] if it reports failure, and
    /// [`ExecutorError::TimedOut`] if the deadline elapses first.
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationOutput, ExecutorError>;
}
