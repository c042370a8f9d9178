//! The applier (§4.5): executes a [`Plan`] against live providers and
//! returns the resulting state.

use std::time::{Duration, Instant};

use picklr_domain::{resolve_references, ChangeAction, Plan, ResourceChange, ResourceState, State, Value};
use picklr_provider::ProviderRegistry;
use tracing::{debug, info, warn};

use crate::retry::{with_retry, RetryConfig, RetryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub address: String,
    pub action: ChangeAction,
    pub status: ProgressStatus,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl ProgressEvent {
    fn started(address: &str, action: ChangeAction) -> ProgressEvent {
        ProgressEvent { address: address.to_string(), action, status: ProgressStatus::Started, duration: None, error: None }
    }

    fn completed(address: &str, action: ChangeAction, duration: Duration) -> ProgressEvent {
        ProgressEvent {
            address: address.to_string(),
            action,
            status: ProgressStatus::Completed,
            duration: Some(duration),
            error: None,
        }
    }

    fn failed(address: &str, action: ChangeAction, duration: Duration, error: &str) -> ProgressEvent {
        ProgressEvent {
            address: address.to_string(),
            action,
            status: ProgressStatus::Failed,
            duration: Some(duration),
            error: Some(error.to_string()),
        }
    }
}

/// The result of running an apply. `state` is always usable for persistence
/// regardless of `errors`/`cancelled` — the applier's whole point is that a
/// partial failure still leaves callers with an up-to-date record of what
/// actually happened.
pub struct ApplyOutcome {
    pub state: State,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl ApplyOutcome {
    /// Collapse the outcome into the typed error a caller that doesn't care
    /// about partial progress can `?` on.
    pub fn into_result(&self) -> Result<(), crate::error::EngineError> {
        if self.cancelled {
            return Err(crate::error::EngineError::Cancelled);
        }
        if !self.errors.is_empty() {
            return Err(crate::error::EngineError::Aggregate(self.errors.clone()));
        }
        Ok(())
    }
}

enum StepOutcome {
    Ok,
    Cancelled,
    Failed(String),
}

/// A resource's `timeout` (seconds) overrides the retry helper's default
/// per-operation timeout; everything else about the backoff policy is
/// unaffected by per-resource configuration.
fn retry_config_for(timeout_secs: Option<u64>) -> RetryConfig {
    match timeout_secs {
        Some(secs) => RetryConfig { timeout: Duration::from_secs(secs), ..RetryConfig::default() },
        None => RetryConfig::default(),
    }
}

/// Apply every change in `plan` against `state`: non-DELETE changes first in
/// plan order (already creation-ordered), then DELETEs in plan order (already
/// destruction-ordered). Stops at the first failure unless `continue_on_error`
/// is set, in which case it keeps going and aggregates every error.
pub async fn apply(
    plan: &Plan,
    state: State,
    registry: &ProviderRegistry,
    continue_on_error: bool,
    mut progress: impl FnMut(ProgressEvent),
    mut is_cancelled: impl FnMut() -> bool,
) -> ApplyOutcome {
    let mut state = state;
    let mut errors = Vec::new();

    let (deletes, create_updates): (Vec<&ResourceChange>, Vec<&ResourceChange>) =
        plan.changes.iter().partition(|c| c.action == ChangeAction::Delete);
    info!(
        create_updates = create_updates.len(),
        deletes = deletes.len(),
        continue_on_error,
        "apply starting"
    );

    for change in create_updates {
        if is_cancelled() {
            warn!("apply cancelled before all changes ran");
            return ApplyOutcome { state, errors, cancelled: true };
        }
        debug!(address = %change.address, action = ?change.action, "applying change");
        match apply_one(change, &mut state, registry, &mut progress, &mut is_cancelled).await {
            StepOutcome::Ok => {}
            StepOutcome::Cancelled => {
                warn!(address = %change.address, "apply cancelled mid-change");
                return ApplyOutcome { state, errors, cancelled: true };
            }
            StepOutcome::Failed(message) => {
                warn!(address = %change.address, error = %message, continue_on_error, "change failed");
                errors.push(message);
                if !continue_on_error {
                    return ApplyOutcome { state, errors, cancelled: false };
                }
            }
        }
    }

    for change in deletes {
        if is_cancelled() {
            warn!("apply cancelled before all deletes ran");
            return ApplyOutcome { state, errors, cancelled: true };
        }
        debug!(address = %change.address, "deleting resource");
        match delete_one(change, &mut state, registry, &mut progress, &mut is_cancelled).await {
            StepOutcome::Ok => {}
            StepOutcome::Cancelled => {
                warn!(address = %change.address, "apply cancelled mid-delete");
                return ApplyOutcome { state, errors, cancelled: true };
            }
            StepOutcome::Failed(message) => {
                warn!(address = %change.address, error = %message, continue_on_error, "delete failed");
                errors.push(message);
                if !continue_on_error {
                    return ApplyOutcome { state, errors, cancelled: false };
                }
            }
        }
    }

    state.serial += 1;
    state.outputs = plan.outputs.clone();

    info!(serial = state.serial, errors = errors.len(), "apply finished");
    ApplyOutcome { state, errors, cancelled: false }
}

async fn apply_one(
    change: &ResourceChange,
    state: &mut State,
    registry: &ProviderRegistry,
    progress: &mut impl FnMut(ProgressEvent),
    is_cancelled: &mut impl FnMut() -> bool,
) -> StepOutcome {
    let Some(desired) = change.desired.as_ref() else {
        return StepOutcome::Failed(format!("{}: non-delete change carries no desired resource", change.address));
    };

    let provider = match registry.get(&desired.provider) {
        Ok(p) => p,
        Err(e) => return StepOutcome::Failed(format!("{}: {e}", change.address)),
    };

    progress(ProgressEvent::started(&change.address, change.action));
    let started_at = Instant::now();

    // References are resolved against live state at apply time, not
    // planning time: upstream outputs may not exist yet when the plan was
    // computed (§4.5).
    let resolved = resolve_references(&Value::Map(desired.properties.clone()), state);
    let Value::Map(resolved_properties) = resolved else {
        unreachable!("resolve_references preserves the Map variant of its input");
    };
    let desired_json = Value::Map(resolved_properties.clone()).to_json();
    let prior_json = state.find(&change.address).map(|rs| Value::Map(rs.outputs.clone()).to_json());

    let retry_config = retry_config_for(desired.timeout);
    let result = with_retry(&retry_config, || is_cancelled(), || {
        provider.apply(&desired.r#type, &desired.name, desired_json.clone(), prior_json.clone())
    })
    .await;

    match result {
        Ok(response) => {
            let outputs = match response.new_state_json {
                serde_json::Value::Object(map) => {
                    map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
                }
                _ => std::collections::BTreeMap::new(),
            };
            state.upsert(ResourceState {
                r#type: desired.r#type.clone(),
                name: desired.name.clone(),
                provider: desired.provider.clone(),
                inputs: desired.properties.clone(),
                inputs_hash: picklr_domain::hash_properties(&desired.properties),
                outputs,
                dependencies: desired.depends_on.clone(),
            });
            progress(ProgressEvent::completed(&change.address, change.action, started_at.elapsed()));
            StepOutcome::Ok
        }
        Err(RetryError::Cancelled) => {
            progress(ProgressEvent::failed(&change.address, change.action, started_at.elapsed(), "cancelled"));
            StepOutcome::Cancelled
        }
        Err(e) => {
            progress(ProgressEvent::failed(&change.address, change.action, started_at.elapsed(), &e.to_string()));
            StepOutcome::Failed(format!("{}: {e}", change.address))
        }
    }
}

async fn delete_one(
    change: &ResourceChange,
    state: &mut State,
    registry: &ProviderRegistry,
    progress: &mut impl FnMut(ProgressEvent),
    is_cancelled: &mut impl FnMut() -> bool,
) -> StepOutcome {
    let Some(prior_resource) = state.find(&change.address) else {
        // Already gone from state; nothing to do.
        return StepOutcome::Ok;
    };
    let provider_name = prior_resource.provider.clone();
    let r#type = prior_resource.r#type.clone();
    let current_state_json = Some(Value::Map(prior_resource.outputs.clone()).to_json());
    let id = prior_resource.id().and_then(Value::as_str).unwrap_or_default().to_string();

    let provider = match registry.get(&provider_name) {
        Ok(p) => p,
        Err(e) => return StepOutcome::Failed(format!("{}: {e}", change.address)),
    };

    progress(ProgressEvent::started(&change.address, ChangeAction::Delete));
    let started_at = Instant::now();

    let result = with_retry(&RetryConfig::default(), || is_cancelled(), || {
        provider.delete(&r#type, &id, current_state_json.clone())
    })
    .await;

    match result {
        Ok(()) => {
            state.remove(&change.address);
            progress(ProgressEvent::completed(&change.address, ChangeAction::Delete, started_at.elapsed()));
            StepOutcome::Ok
        }
        Err(RetryError::Cancelled) => {
            progress(ProgressEvent::failed(&change.address, ChangeAction::Delete, started_at.elapsed(), "cancelled"));
            StepOutcome::Cancelled
        }
        Err(e) => {
            progress(ProgressEvent::failed(&change.address, ChangeAction::Delete, started_at.elapsed(), &e.to_string()));
            StepOutcome::Failed(format!("{}: {e}", change.address))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use picklr_domain::{Lifecycle, PropertyDiff, Resource};
    use picklr_provider::testing::NullProvider;
    use picklr_provider::Provider;

    use super::*;

    fn registry_with_null() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_factory("null", || Ok(Arc::new(NullProvider::new()) as Arc<dyn Provider>));
        registry.load("null").unwrap();
        registry
    }

    fn create_change(name: &str, props: BTreeMap<String, Value>) -> ResourceChange {
        ResourceChange {
            address: format!("null_resource.{name}"),
            action: ChangeAction::Create,
            desired: Some(Resource {
                r#type: "null_resource".into(),
                name: name.into(),
                provider: "null".into(),
                properties: props,
                depends_on: vec![],
                lifecycle: Lifecycle::default(),
                count: None,
                for_each: None,
                timeout: None,
            }),
            prior: None,
            diff: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn applying_a_create_adds_a_resource_to_state() {
        let registry = registry_with_null();
        let mut plan = Plan::default();
        plan.push(create_change("a", [("k".to_string(), Value::String("v".into()))].into_iter().collect()));

        let outcome = apply(&plan, State::empty(), &registry, false, |_| {}, || false).await;
        outcome.into_result().unwrap();
        assert_eq!(outcome.state.resources.len(), 1);
        assert!(outcome.state.find("null_resource.a").unwrap().id().is_some());
    }

    #[tokio::test]
    async fn apply_resolves_references_against_state_mutated_earlier_in_the_same_run() {
        let registry = registry_with_null();
        let mut plan = Plan::default();
        plan.push(create_change("vpc", BTreeMap::new()));
        plan.push(create_change(
            "subnet",
            [("vpcId".to_string(), Value::String("ptr://null:null_resource/vpc/id".into()))].into_iter().collect(),
        ));

        let outcome = apply(&plan, State::empty(), &registry, false, |_| {}, || false).await;
        outcome.into_result().unwrap();
        let vpc_id = outcome.state.find("null_resource.vpc").unwrap().id().unwrap().clone();
        let subnet = outcome.state.find("null_resource.subnet").unwrap();
        assert_eq!(subnet.outputs["vpcId"], vpc_id);
    }

    #[tokio::test]
    async fn apply_resolves_references_when_type_is_provider_qualified() {
        let registry = ProviderRegistry::new();
        registry.register_factory("aws", || Ok(Arc::new(NullProvider::new()) as Arc<dyn Provider>));
        registry.load("aws").unwrap();

        let mut plan = Plan::default();
        plan.push(ResourceChange {
            address: "aws:EC2.Vpc.v".into(),
            action: ChangeAction::Create,
            desired: Some(Resource {
                r#type: "aws:EC2.Vpc".into(),
                name: "v".into(),
                provider: "aws".into(),
                properties: BTreeMap::new(),
                depends_on: vec![],
                lifecycle: Lifecycle::default(),
                count: None,
                for_each: None,
                timeout: None,
            }),
            prior: None,
            diff: BTreeMap::new(),
        });
        plan.push(ResourceChange {
            address: "aws:EC2.Subnet.s".into(),
            action: ChangeAction::Create,
            desired: Some(Resource {
                r#type: "aws:EC2.Subnet".into(),
                name: "s".into(),
                provider: "aws".into(),
                properties: [("vpcId".to_string(), Value::String("ptr://aws:EC2.Vpc/v/id".into()))]
                    .into_iter()
                    .collect(),
                depends_on: vec![],
                lifecycle: Lifecycle::default(),
                count: None,
                for_each: None,
                timeout: None,
            }),
            prior: None,
            diff: BTreeMap::new(),
        });

        let outcome = apply(&plan, State::empty(), &registry, false, |_| {}, || false).await;
        outcome.into_result().unwrap();
        let vpc_id = outcome.state.find("aws:EC2.Vpc.v").unwrap().id().unwrap().clone();
        let subnet = outcome.state.find("aws:EC2.Subnet.s").unwrap();
        assert_eq!(subnet.outputs["vpcId"], vpc_id);
    }

    #[tokio::test]
    async fn a_delete_change_removes_the_resource_from_state() {
        let registry = registry_with_null();
        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "a".into(),
            provider: "null".into(),
            inputs: BTreeMap::new(),
            inputs_hash: "h".into(),
            outputs: [("id".to_string(), Value::String("null-1".into()))].into_iter().collect(),
            dependencies: vec![],
        });

        let mut plan = Plan::default();
        plan.push(ResourceChange {
            address: "null_resource.a".into(),
            action: ChangeAction::Delete,
            desired: None,
            prior: None,
            diff: BTreeMap::new(),
        });

        let outcome = apply(&plan, state, &registry, false, |_| {}, || false).await;
        outcome.into_result().unwrap();
        assert!(outcome.state.resources.is_empty());
    }

    #[tokio::test]
    async fn a_failure_halts_the_run_without_continue_on_error() {
        let registry = ProviderRegistry::new();
        // No factory registered for "null": every apply fails with ProviderNotFound.
        let mut plan = Plan::default();
        plan.push(create_change("a", BTreeMap::new()));
        plan.push(create_change("b", BTreeMap::new()));

        let outcome = apply(&plan, State::empty(), &registry, false, |_| {}, || false).await;
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.state.resources.is_empty());
    }

    #[tokio::test]
    async fn continue_on_error_keeps_going_and_aggregates_errors() {
        let registry = ProviderRegistry::new();
        let mut plan = Plan::default();
        plan.push(create_change("a", BTreeMap::new()));
        plan.push(create_change("b", BTreeMap::new()));

        let outcome = apply(&plan, State::empty(), &registry, true, |_| {}, || false).await;
        assert_eq!(outcome.errors.len(), 2);
        assert!(matches!(outcome.into_result(), Err(crate::error::EngineError::Aggregate(_))));
    }

    #[tokio::test]
    async fn cancellation_before_a_change_stops_immediately() {
        let registry = registry_with_null();
        let mut plan = Plan::default();
        plan.push(create_change("a", BTreeMap::new()));

        let outcome = apply(&plan, State::empty(), &registry, false, |_| {}, || true).await;
        assert!(outcome.cancelled);
        assert!(outcome.state.resources.is_empty());
    }

    #[tokio::test]
    async fn progress_events_are_emitted_for_each_change() {
        let registry = registry_with_null();
        let mut plan = Plan::default();
        plan.push(create_change("a", BTreeMap::new()));

        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = events.clone();
        let outcome = apply(&plan, State::empty(), &registry, false, move |e| seen.lock().unwrap().push(e), || false).await;
        outcome.into_result().unwrap();

        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].status, ProgressStatus::Started);
        assert_eq!(recorded[1].status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn deletes_run_after_creates_regardless_of_plan_order() {
        let registry = registry_with_null();
        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "old".into(),
            provider: "null".into(),
            inputs: BTreeMap::new(),
            inputs_hash: "h".into(),
            outputs: [("id".to_string(), Value::String("null-1".into()))].into_iter().collect(),
            dependencies: vec![],
        });

        let mut plan = Plan::default();
        plan.push(ResourceChange {
            address: "null_resource.old".into(),
            action: ChangeAction::Delete,
            desired: None,
            prior: None,
            diff: BTreeMap::new(),
        });
        plan.push(create_change("new", BTreeMap::new()));

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let track = order.clone();
        let outcome = apply(&plan, state, &registry, false, move |e| track.lock().unwrap().push(e.address.clone()), || false).await;
        outcome.into_result().unwrap();

        let recorded = order.lock().unwrap();
        let new_started = recorded.iter().position(|a| a == "null_resource.new").unwrap();
        let old_started = recorded.iter().position(|a| a == "null_resource.old").unwrap();
        assert!(new_started < old_started);
    }

    #[test]
    fn retry_config_for_uses_the_resource_timeout_override() {
        let overridden = retry_config_for(Some(120));
        assert_eq!(overridden.timeout, Duration::from_secs(120));
        assert_eq!(overridden.base_interval, RetryConfig::default().base_interval);

        let default = retry_config_for(None);
        assert_eq!(default.timeout, RetryConfig::default().timeout);
    }
}
