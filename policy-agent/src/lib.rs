//! policy-agent library crate.
//!
//! Runs named collection policies on their own schedules and forwards the
//! produced records to an ingestion sink. Policies are added and removed at
//! runtime through the HTTP API in [`api`].

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod policy;

pub use error::{Error, Result};
