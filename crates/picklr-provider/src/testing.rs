//! A reference provider and conformance suite for testing any [`Provider`]
//! implementation. Test-only scaffolding, not a product offering — mirrors
//! the role the teacher's `LocalDriver` plays for its own driver trait.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::provider::{ApplyResponse, PlanResponse, Provider, ProviderAction, ReadResponse};

/// An entirely in-memory provider. `apply` assigns an `id` (reusing the
/// prior one on update) and echoes `desired` back as `outputs`; `plan`
/// diffs top-level JSON object keys structurally.
pub struct NullProvider {
    instances: Mutex<BTreeMap<String, Value>>,
    next_id: AtomicU64,
    force_replace_attrs: Vec<String>,
}

impl Default for NullProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NullProvider {
    pub fn new() -> Self {
        NullProvider {
            instances: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            force_replace_attrs: Vec::new(),
        }
    }

    /// A `NullProvider` where changing any of `attrs` causes `plan` to
    /// return `REPLACE` instead of `UPDATE`.
    pub fn with_force_replace(attrs: impl IntoIterator<Item = &'static str>) -> Self {
        NullProvider {
            force_replace_attrs: attrs.into_iter().map(str::to_string).collect(),
            ..Self::new()
        }
    }

    fn allocate_id(&self) -> String {
        format!("null-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn object_keys(v: &Value) -> BTreeMap<String, Value> {
    match v {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

#[async_trait]
impl Provider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn configure(&self, _settings: Value) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    async fn get_schema(&self) -> Result<(String, String), ProviderError> {
        Ok(("{}".to_string(), "1.0.0".to_string()))
    }

    async fn plan(
        &self,
        _type: &str,
        _name: &str,
        desired_json: Option<Value>,
        prior_json: Option<Value>,
    ) -> Result<PlanResponse, ProviderError> {
        let desired = desired_json.map(|v| object_keys(&v)).unwrap_or_default();

        let Some(prior) = prior_json.map(|v| object_keys(&v)) else {
            let action = if desired.is_empty() { ProviderAction::Noop } else { ProviderAction::Create };
            let changed_attributes = if action == ProviderAction::Create {
                desired.keys().cloned().collect()
            } else {
                Vec::new()
            };
            return Ok(PlanResponse { action, changed_attributes });
        };

        // Only keys `desired` actually declares can be "changed" — `prior` is
        // the provider's last echoed state and may carry computed-only
        // attributes (like `id`) that never appear in desired properties at
        // all, so their mere absence from `desired` isn't a change.
        let mut changed_attributes: Vec<String> = desired
            .iter()
            .filter(|(k, v)| prior.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        changed_attributes.sort();
        changed_attributes.dedup();

        let action = if changed_attributes.is_empty() {
            ProviderAction::Noop
        } else if changed_attributes.iter().any(|a| self.force_replace_attrs.contains(a)) {
            ProviderAction::Replace
        } else {
            ProviderAction::Update
        };

        Ok(PlanResponse { action, changed_attributes })
    }

    async fn apply(
        &self,
        _type: &str,
        _name: &str,
        desired_json: Value,
        prior_json: Option<Value>,
    ) -> Result<ApplyResponse, ProviderError> {
        let id = prior_json
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.allocate_id());

        let mut outputs = object_keys(&desired_json);
        outputs.insert("id".to_string(), json!(id.clone()));
        let new_state_json: Value = outputs.into_iter().collect::<serde_json::Map<_, _>>().into();

        self.instances.lock().expect("null provider poisoned").insert(id, new_state_json.clone());
        Ok(ApplyResponse { new_state_json })
    }

    async fn read(
        &self,
        _type: &str,
        id: &str,
        _current_state_json: Option<Value>,
    ) -> Result<ReadResponse, ProviderError> {
        let instances = self.instances.lock().expect("null provider poisoned");
        match instances.get(id) {
            Some(state) => Ok(ReadResponse { exists: true, new_state_json: state.clone() }),
            None => Ok(ReadResponse { exists: false, new_state_json: Value::Null }),
        }
    }

    async fn delete(
        &self,
        _type: &str,
        id: &str,
        _current_state_json: Option<Value>,
    ) -> Result<(), ProviderError> {
        self.instances.lock().expect("null provider poisoned").remove(id);
        Ok(())
    }
}

/// Exercises the contract invariants from the provider-design section
/// against any `Provider` implementation. Panics (via `assert!`) on the
/// first violated invariant, so it's meant to be called from inside a test
/// function, not production code.
pub async fn run_conformance_suite(provider: &dyn Provider) {
    provider.configure(json!({})).await.expect("configure should succeed");
    provider.configure(json!({})).await.expect("configure should be idempotent");

    let desired = json!({"triggers": {"k": "v"}});
    let plan_no_prior = provider.plan("t", "a", Some(desired.clone()), None).await.unwrap();
    assert_eq!(plan_no_prior.action, ProviderAction::Create, "CREATE iff desired is non-empty");

    let empty_plan = provider.plan("t", "a", Some(json!({})), None).await.unwrap();
    assert_eq!(empty_plan.action, ProviderAction::Noop, "empty desired with no prior is NOOP");

    let applied = provider.apply("t", "a", desired.clone(), None).await.unwrap();
    assert!(
        applied.new_state_json.get("id").and_then(Value::as_str).is_some(),
        "apply must return a non-empty id"
    );

    let noop_plan = provider
        .plan("t", "a", Some(desired.clone()), Some(applied.new_state_json.clone()))
        .await
        .unwrap();
    assert_eq!(noop_plan.action, ProviderAction::Noop, "plan against what apply just produced is NOOP");

    let id = applied.new_state_json.get("id").and_then(Value::as_str).unwrap().to_string();
    let read_existing = provider.read("t", &id, None).await.unwrap();
    assert!(read_existing.exists, "read of an existing id must report exists=true");
    assert!(
        !matches!(read_existing.new_state_json, Value::Null),
        "read of an existing id must return non-empty state"
    );

    provider.delete("t", &id, None).await.unwrap();
    let read_after_delete = provider.read("t", &id, None).await.unwrap();
    assert!(!read_after_delete.exists, "read after delete must report exists=false");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_satisfies_conformance_suite() {
        run_conformance_suite(&NullProvider::new()).await;
    }

    #[tokio::test]
    async fn changing_a_force_replace_attr_yields_replace() {
        let provider = NullProvider::with_force_replace(["immutable_id"]);
        let prior = provider
            .apply("t", "a", json!({"immutable_id": "1", "size": "small"}), None)
            .await
            .unwrap();

        let plan = provider
            .plan(
                "t",
                "a",
                Some(json!({"immutable_id": "2", "size": "small"})),
                Some(prior.new_state_json),
            )
            .await
            .unwrap();
        assert_eq!(plan.action, ProviderAction::Replace);
        assert_eq!(plan.changed_attributes, vec!["immutable_id".to_string()]);
    }

    #[tokio::test]
    async fn changing_a_non_force_attr_yields_update() {
        let provider = NullProvider::with_force_replace(["immutable_id"]);
        let prior = provider
            .apply("t", "a", json!({"immutable_id": "1", "size": "small"}), None)
            .await
            .unwrap();

        let plan = provider
            .plan(
                "t",
                "a",
                Some(json!({"immutable_id": "1", "size": "large"})),
                Some(prior.new_state_json),
            )
            .await
            .unwrap();
        assert_eq!(plan.action, ProviderAction::Update);
    }
}
