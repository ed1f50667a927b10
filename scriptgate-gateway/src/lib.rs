//! HTTPS gateway that relays caller parameters to local scripts.
//!
//! Exposes a fixed set of endpoints, each backed by one script in the
//! configured directory, and relays the script's output as the response.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod cors;
pub mod error;
pub mod routes;
pub mod server;
