//! HTTP control surface.
//!
//! Provides endpoints for submitting and deleting policies and for
//! reporting agent status.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
