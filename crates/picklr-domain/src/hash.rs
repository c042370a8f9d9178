use sha2::{Digest, Sha256};

use crate::value::Value;

/// Stable SHA-256 digest of a mapping of properties, independent of key
/// insertion order. Used to populate `ResourceState.inputs_hash`.
///
/// `Value::Map` is already `BTreeMap`-backed, so no extra key-sorting pass is
/// needed before serializing — unlike a `HashMap`-backed representation.
pub fn hash_properties(properties: &std::collections::BTreeMap<String, Value>) -> String {
    let json = Value::Map(properties.clone()).to_json();
    let bytes = serde_json::to_vec(&json).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}
