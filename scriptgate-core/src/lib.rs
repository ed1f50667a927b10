//! Core types for the scriptgate script-execution gateway.
//!
//! Defines the startup configuration store, the request envelope relayed to
//! scripts, invocation identifiers and the route directory shown on the
//! landing page.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod id;

pub use config::{Configuration, GatewaySettings};
pub use directory::{RouteDescriptor, RouteDirectory};
pub use envelope::QueryEnvelope;
pub use error::ConfigError;
pub use id::InvocationId;
