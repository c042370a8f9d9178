use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// The last-observed shape of a single resource instance, as recorded in
/// state. `inputs` is what was last applied (not what's newly desired);
/// `outputs` is whatever the provider returned from that apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub r#type: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    pub inputs_hash: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceState {
    pub fn address(&self) -> String {
        format!("{}.{}", self.r#type, self.name)
    }

    /// The provider's primary identifier, by convention `outputs["id"]`.
    pub fn id(&self) -> Option<&Value> {
        self.outputs.get("id")
    }
}

/// The full persisted state of a workspace: every resource instance the
/// engine currently believes exists, plus top-level outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    pub serial: u64,
    pub lineage: String,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl State {
    /// A fresh state for a workspace that has never been applied to.
    pub fn empty() -> State {
        State {
            version: 1,
            serial: 0,
            lineage: Uuid::new_v4().to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn find(&self, address: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.address() == address)
    }

    pub fn position(&self, address: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.address() == address)
    }

    /// Replace the resource at `address` if present, otherwise append it.
    pub fn upsert(&mut self, resource: ResourceState) {
        match self.position(&resource.address()) {
            Some(idx) => self.resources[idx] = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, address: &str) {
        self.resources.retain(|r| r.address() != address);
    }
}
