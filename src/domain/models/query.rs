//! Query descriptions and the request keys derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque backend record: field name to value.
pub type Item = Map<String, Value>;

/// A logical query against one backend entity collection.
///
/// Built with [`QuerySpec::new`] and the chained setters:
///
/// ```
/// use serde_json::json;
/// use trellis::domain::models::QuerySpec;
///
/// let spec = QuerySpec::new("Task")
///     .filter(json!({ "status": "open" }))
///     .sort("-created_date")
///     .limit(50);
/// assert_eq!(spec.entity, "Task");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Name of the backend collection, e.g. `Garden` or `Task`.
    pub entity: String,

    /// Field to match-criteria mapping. `null` and `{}` both mean "no filter".
    #[serde(default)]
    pub filter: Value,

    /// Backend ordering hint. `None` means backend default order.
    #[serde(default)]
    pub sort: Option<String>,

    /// Cap on returned items. `None` resolves to the orchestrator's default limit.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl QuerySpec {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: Value::Null,
            sort: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = filter;
        self
    }

    /// Set the ordering hint. An empty string clears it.
    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        let sort = sort.into();
        self.sort = if sort.is_empty() { None } else { Some(sort) };
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the filter selects everything, so the backend `list` call applies.
    pub fn is_unfiltered(&self) -> bool {
        match &self.filter {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Sort hint with empty strings treated as absent.
    pub fn sort_hint(&self) -> Option<&str> {
        self.sort.as_deref().filter(|s| !s.is_empty())
    }
}

/// Deterministic identity of a query, used for both caching and coalescing.
///
/// The filter is serialized canonically (object keys sorted at every depth),
/// so logically equal filters built in a different key order share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    entity: String,
    fingerprint: String,
}

impl RequestKey {
    /// Derive the key for `spec` with its limit already resolved.
    pub fn new(spec: &QuerySpec, limit: u32) -> Self {
        let filter = if spec.is_unfiltered() {
            "{}".to_string()
        } else {
            canonical_json(&spec.filter)
        };

        Self {
            entity: spec.entity.clone(),
            fingerprint: format!(
                "{filter}|{}|{limit}",
                spec.sort_hint().unwrap_or_default()
            ),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.entity, self.fingerprint)
    }
}

/// Serialize `value` with object keys sorted recursively.
///
/// Does not rely on the map ordering `serde_json` happens to be compiled with.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings always serialize.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(values) => {
            out.push('[');
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(value, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
