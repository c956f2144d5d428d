//! Infrastructure layer module
//!
//! This module contains the infrastructure adapters and external integrations:
//! - Hosted entity API client (reqwest)
//! - Configuration management
//! - Logging infrastructure
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod backend;
pub mod config;
pub mod logging;
