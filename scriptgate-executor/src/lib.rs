//! Bounded execution of external scripts for the scriptgate gateway.
//!
//! Spawns one child process per invocation, collects its combined output,
//! and guarantees the child does not outlive its deadline or the request
//! that started it.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod error;
pub mod invocation;
pub mod process;

pub use backend::ScriptBackend;
pub use error::ExecutorError;
pub use invocation::{Invocation, InvocationOutput, SCRIPT_TIMEOUT};
pub use process::ProcessBackend;
