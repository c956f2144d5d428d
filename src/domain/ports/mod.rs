//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - EntityApi: list/filter calls against the hosted entity store
//! - Sleeper: the wait between rate-limit retries
//!
//! These traits keep the orchestrator independent of the HTTP backend and of
//! wall-clock time, so tests can substitute both.

pub mod entity_api;
pub mod sleeper;

pub use entity_api::EntityApi;
pub use sleeper::{Sleeper, TokioSleeper};
