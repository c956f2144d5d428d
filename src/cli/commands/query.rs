//! Implementation of the `trellis query` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, Item, QuerySpec};
use crate::infrastructure::backend::HttpEntityApi;
use crate::services::{QueryOrchestrator, QueryStats};

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Entity to query, e.g. Garden or Task
    pub entity: String,

    /// Match criteria as a JSON object, e.g. '{"status":"open"}'
    #[arg(short, long, value_parser = parse_filter)]
    pub filter: Option<Value>,

    /// Sort hint passed through to the backend, e.g. -created_date
    #[arg(short, long)]
    pub sort: Option<String>,

    /// Maximum number of records (defaults to cache.default_limit)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: Option<u32>,

    /// Issue the same query this many times concurrently
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=64))]
    pub repeat: u8,
}

fn parse_filter(raw: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| format!("filter is not valid JSON: {e}"))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("filter must be a JSON object".to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub entity: String,
    pub count: usize,
    pub items: Vec<Item>,
    pub stats: QueryStats,
}

impl CommandOutput for QueryOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut sections = Vec::new();

        if self.items.is_empty() {
            sections.push(format!("No {} records found.", self.entity));
        } else {
            sections.push(formatter.format_items(&self.items));
            sections.push(format!("{} {} record(s)", self.count, self.entity));
        }
        sections.push(formatter.format_stats(&self.stats));

        sections.join("\n\n")
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: QueryArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = HttpEntityApi::with_config(&config.backend, &config.rate_limit)
        .context("Failed to create entity API client")?;
    let orchestrator = QueryOrchestrator::from_config(Arc::new(api), config);

    let mut spec = QuerySpec::new(args.entity.clone());
    if let Some(filter) = args.filter {
        spec = spec.filter(filter);
    }
    if let Some(sort) = args.sort {
        spec = spec.sort(sort);
    }
    if let Some(limit) = args.limit {
        spec = spec.limit(limit);
    }

    info!(entity = %spec.entity, repeat = args.repeat, "running query");

    let results = join_all((0..args.repeat).map(|_| orchestrator.query(spec.clone()))).await;

    // Coalesced callers all see the same outcome, so the first one speaks for the batch.
    let items = results
        .into_iter()
        .next()
        .unwrap_or_else(|| Ok(Vec::new()))?;

    let result = QueryOutput {
        entity: args.entity,
        count: items.len(),
        items,
        stats: orchestrator.stats(),
    };
    output(&result, json_mode);

    Ok(())
}
