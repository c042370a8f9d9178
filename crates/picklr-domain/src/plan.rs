use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Delete,
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub forces_replacement: bool,
    pub action: DiffAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub address: String,
    pub action: ChangeAction,
    pub desired: Option<Resource>,
    pub prior: Option<Resource>,
    #[serde(default)]
    pub diff: BTreeMap<String, PropertyDiff>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub replace: usize,
    pub noop: usize,
}

impl PlanSummary {
    pub fn record(&mut self, action: ChangeAction) {
        match action {
            ChangeAction::Create => self.create += 1,
            ChangeAction::Update => self.update += 1,
            ChangeAction::Delete => self.delete += 1,
            ChangeAction::Replace => self.replace += 1,
            ChangeAction::Noop => self.noop += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub timestamp: Option<String>,
    pub config_hash: Option<String>,
    pub prior_state_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub metadata: PlanMetadata,
    pub changes: Vec<ResourceChange>,
    pub summary: PlanSummary,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Plan {
    pub fn push(&mut self, change: ResourceChange) {
        self.summary.record(change.action);
        self.changes.push(change);
    }
}
