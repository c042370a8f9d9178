use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;
use crate::value::Value;

/// The desired state of a workspace, produced once per run by whatever
/// evaluator sits in front of this engine (out of scope here).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Config {
    pub fn find(&self, address: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.address() == address)
    }
}
