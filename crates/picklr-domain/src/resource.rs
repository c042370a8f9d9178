use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Lifecycle controls a resource carries across plan/apply. Mirrors the
/// handful of switches real IaC tools expose rather than inventing new ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub create_before_destroy: bool,
    #[serde(default)]
    pub prevent_destroy: bool,
    #[serde(default)]
    pub ignore_changes: Vec<String>,
}

/// A single declared resource as it appears in a `Config`, prior to
/// expansion. `count`/`for_each` are mutually exclusive per the expansion
/// rules in `picklr-graph`; this type doesn't enforce that itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub r#type: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub for_each: Option<BTreeMap<String, Value>>,
    /// Per-resource override for the retry helper's per-operation timeout
    /// (§4.11), in seconds. `None` falls back to `RetryConfig::default`'s
    /// 30-minute timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Resource {
    /// `type.name`, the address used throughout the graph, plan and state.
    pub fn address(&self) -> String {
        format!("{}.{}", self.r#type, self.name)
    }

    /// A resource reconstructed from prior state carries none of the
    /// expansion or lifecycle metadata that only lives in config.
    pub fn from_state_inputs(
        r#type: String,
        name: String,
        provider: String,
        inputs: BTreeMap<String, Value>,
    ) -> Resource {
        Resource {
            r#type,
            name,
            provider,
            properties: inputs,
            depends_on: Vec::new(),
            lifecycle: Lifecycle::default(),
            count: None,
            for_each: None,
            timeout: None,
        }
    }
}
