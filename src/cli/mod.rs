//! Command line interface for Trellis.

pub mod commands;
pub mod output;
pub mod types;

use serde_json::json;

use crate::domain::errors::QueryError;

pub use types::{Cli, Commands};

/// Report a command failure and exit with status 1.
///
/// Query failures keep their classification: in JSON mode they are printed as
/// `{code, message, retry_in_ms}` so scripts can back off on `RATE_LIMIT`.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let query_error = err.downcast_ref::<QueryError>();

    if json_mode {
        let body = query_error.map_or_else(
            || json!({ "code": "ERROR", "message": format!("{err:#}") }),
            |qe| {
                json!({
                    "code": qe.code(),
                    "message": qe.to_string(),
                    "retry_in_ms": qe.retry_in_ms(),
                })
            },
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        match query_error {
            Some(qe) => {
                eprintln!("Error [{}]: {qe}", qe.code());
                if let Some(ms) = qe.retry_in_ms() {
                    eprintln!("Retry in {ms} ms");
                }
            }
            None => eprintln!("Error: {err:#}"),
        }
    }

    std::process::exit(1);
}
