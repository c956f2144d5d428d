//! Domain layer for the Trellis request orchestrator
//!
//! Query descriptions, configuration models, error types, and the port the
//! hosted backend is reached through.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{BackendError, QueryError, QueryErrorCode};
