//! The planner (§4.4): diffs desired configuration against prior state and
//! produces a [`Plan`].

use std::collections::{BTreeSet, HashMap, HashSet};

use picklr_domain::{ChangeAction, Config, Plan, PropertyDiff, Resource, State, Value};
use picklr_graph::Graph;
use picklr_provider::{ProviderAction, ProviderRegistry};
use tracing::{debug, info};

use crate::diff::diff_properties;
use crate::error::EngineError;

fn map_action(action: ProviderAction) -> ChangeAction {
    match action {
        ProviderAction::Create => ChangeAction::Create,
        ProviderAction::Update => ChangeAction::Update,
        ProviderAction::Replace => ChangeAction::Replace,
        ProviderAction::Delete => ChangeAction::Delete,
        ProviderAction::Noop => ChangeAction::Noop,
    }
}

/// Produce a plan for `cfg` against `state`. `targets` restricts the plan to
/// the named addresses plus their transitive dependencies (an empty slice
/// plans everything).
pub async fn plan(
    cfg: &Config,
    state: &State,
    registry: &ProviderRegistry,
    targets: &[String],
) -> Result<Plan, EngineError> {
    info!(resources = cfg.resources.len(), targets = targets.len(), "planning");

    let distinct_providers: BTreeSet<&str> = cfg.resources.iter().map(|r| r.provider.as_str()).collect();
    for name in distinct_providers {
        registry.load(name)?;
    }

    let expanded = picklr_graph::expand(&cfg.resources)?;
    let graph = Graph::build(&expanded)?;
    debug!(nodes = graph.creation_order().len(), "graph built");

    let state_by_addr: HashMap<String, &picklr_domain::ResourceState> =
        state.resources.iter().map(|r| (r.address(), r)).collect();
    let cfg_by_addr: HashMap<String, &Resource> = expanded.iter().map(|r| (r.address(), r)).collect();

    let target_set: Option<HashSet<String>> = if targets.is_empty() {
        None
    } else {
        let mut set: HashSet<String> = targets.iter().cloned().collect();
        for t in targets {
            set.extend(graph.transitive_deps(t));
        }
        Some(set)
    };

    let mut result = Plan::default();

    for addr in graph.creation_order() {
        let res = cfg_by_addr
            .get(addr)
            .expect("graph is built from the same expanded resource set as cfg_by_addr");

        if let Some(ref set) = target_set {
            if !set.contains(addr) {
                result.summary.noop += 1;
                continue;
            }
        }

        let properties = res.properties.clone();
        let provider = registry.get(&res.provider)?;

        let prior_state = state_by_addr.get(addr).copied();
        let prior_json = prior_state.map(|s| Value::Map(s.outputs.clone()).to_json());
        let desired_json = Value::Map(properties.clone()).to_json();

        let plan_resp = provider
            .plan(&res.r#type, &res.name, Some(desired_json), prior_json)
            .await
            .map_err(|e| EngineError::PlanError { address: addr.clone(), message: e.to_string() })?;

        if res.lifecycle.prevent_destroy
            && matches!(plan_resp.action, ProviderAction::Delete | ProviderAction::Replace)
        {
            return Err(EngineError::PreventDestroyViolation(addr.clone()));
        }

        let mut action = map_action(plan_resp.action);
        if action == ChangeAction::Update
            && !res.lifecycle.ignore_changes.is_empty()
            && plan_resp.changed_attributes.iter().all(|a| res.lifecycle.ignore_changes.contains(a))
        {
            action = ChangeAction::Noop;
        }

        if action == ChangeAction::Noop {
            result.summary.noop += 1;
            continue;
        }

        debug!(address = %addr, action = ?action, "resource change planned");

        let prior_properties = prior_state.map(|s| s.inputs.clone()).unwrap_or_default();
        let diff = diff_properties(&prior_properties, &properties);
        let prior_resource = prior_state.map(|s| {
            Resource::from_state_inputs(s.r#type.clone(), s.name.clone(), s.provider.clone(), s.inputs.clone())
        });

        result.push(picklr_domain::ResourceChange {
            address: addr.clone(),
            action,
            desired: Some((*res).clone()),
            prior: prior_resource,
            diff,
        });
    }

    for state_res in &state.resources {
        let addr = state_res.address();
        if cfg_by_addr.contains_key(&addr) {
            continue;
        }
        if let Some(ref set) = target_set {
            if !set.contains(&addr) {
                continue;
            }
        }

        let diff: std::collections::BTreeMap<String, PropertyDiff> = state_res
            .inputs
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    PropertyDiff {
                        before: Some(v.clone()),
                        after: None,
                        sensitive: false,
                        forces_replacement: false,
                        action: picklr_domain::DiffAction::Delete,
                    },
                )
            })
            .collect();

        result.push(picklr_domain::ResourceChange {
            address: addr,
            action: ChangeAction::Delete,
            desired: None,
            prior: Some(Resource::from_state_inputs(
                state_res.r#type.clone(),
                state_res.name.clone(),
                state_res.provider.clone(),
                state_res.inputs.clone(),
            )),
            diff,
        });
    }

    result.outputs = cfg.outputs.clone();
    result.metadata.timestamp = Some(chrono::Utc::now().to_rfc3339());

    info!(
        create = result.summary.create,
        update = result.summary.update,
        replace = result.summary.replace,
        delete = result.summary.delete,
        noop = result.summary.noop,
        "plan complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use picklr_domain::{Lifecycle, ResourceState};
    use picklr_provider::testing::NullProvider;
    use picklr_provider::Provider;

    use super::*;

    fn registry_with_null() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_factory("null", || Ok(Arc::new(NullProvider::new()) as Arc<dyn Provider>));
        registry
    }

    fn resource(name: &str, props: BTreeMap<String, Value>) -> Resource {
        Resource {
            r#type: "null_resource".into(),
            name: name.into(),
            provider: "null".into(),
            properties: props,
            depends_on: vec![],
            lifecycle: Lifecycle::default(),
            count: None,
            for_each: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn plans_a_create_from_empty_state() {
        let registry = registry_with_null();
        let cfg = Config {
            resources: vec![resource("a", [("k".to_string(), Value::String("v".into()))].into_iter().collect())],
            outputs: BTreeMap::new(),
        };
        let result = plan(&cfg, &State::empty(), &registry, &[]).await.unwrap();
        assert_eq!(result.summary.create, 1);
        assert_eq!(result.changes[0].action, ChangeAction::Create);
        assert_eq!(result.changes[0].address, "null_resource.a");
    }

    #[tokio::test]
    async fn unchanged_resource_is_a_noop_and_not_recorded_as_a_change() {
        let registry = registry_with_null();
        let mut props = BTreeMap::new();
        props.insert("k".to_string(), Value::String("v".into()));
        let cfg = Config { resources: vec![resource("a", props.clone())], outputs: BTreeMap::new() };

        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "a".into(),
            provider: "null".into(),
            inputs: props.clone(),
            inputs_hash: picklr_domain::hash_properties(&props),
            outputs: [("id".to_string(), Value::String("null-1".into())), ("k".to_string(), Value::String("v".into()))]
                .into_iter()
                .collect(),
            dependencies: vec![],
        });

        let result = plan(&cfg, &state, &registry, &[]).await.unwrap();
        assert_eq!(result.summary.noop, 1);
        assert!(result.changes.is_empty());
    }

    #[tokio::test]
    async fn resource_removed_from_config_plans_a_delete() {
        let registry = registry_with_null();
        let cfg = Config::default();
        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "gone".into(),
            provider: "null".into(),
            inputs: [("k".to_string(), Value::String("v".into()))].into_iter().collect(),
            inputs_hash: "h".into(),
            outputs: [("id".to_string(), Value::String("null-9".into()))].into_iter().collect(),
            dependencies: vec![],
        });

        let result = plan(&cfg, &state, &registry, &[]).await.unwrap();
        assert_eq!(result.summary.delete, 1);
        assert_eq!(result.changes[0].action, ChangeAction::Delete);
        assert_eq!(result.changes[0].address, "null_resource.gone");
    }

    #[tokio::test]
    async fn prevent_destroy_blocks_a_replace() {
        let registry = ProviderRegistry::new();
        registry.register_factory("null", || {
            Ok(Arc::new(NullProvider::with_force_replace(["immutable"])) as Arc<dyn Provider>)
        });

        let mut lifecycle = Lifecycle::default();
        lifecycle.prevent_destroy = true;
        let mut res = resource("a", [("immutable".to_string(), Value::String("2".into()))].into_iter().collect());
        res.lifecycle = lifecycle;
        let cfg = Config { resources: vec![res], outputs: BTreeMap::new() };

        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "a".into(),
            provider: "null".into(),
            inputs: [("immutable".to_string(), Value::String("1".into()))].into_iter().collect(),
            inputs_hash: "h".into(),
            outputs: [
                ("id".to_string(), Value::String("null-1".into())),
                ("immutable".to_string(), Value::String("1".into())),
            ]
            .into_iter()
            .collect(),
            dependencies: vec![],
        });

        let result = plan(&cfg, &state, &registry, &[]).await;
        assert!(matches!(result, Err(EngineError::PreventDestroyViolation(addr)) if addr == "null_resource.a"));
    }

    #[tokio::test]
    async fn ignore_changes_downgrades_an_update_to_noop() {
        let registry = registry_with_null();
        let mut lifecycle = Lifecycle::default();
        lifecycle.ignore_changes = vec!["k".to_string()];
        let mut res = resource("a", [("k".to_string(), Value::String("new".into()))].into_iter().collect());
        res.lifecycle = lifecycle;
        let cfg = Config { resources: vec![res], outputs: BTreeMap::new() };

        let mut state = State::empty();
        state.resources.push(ResourceState {
            r#type: "null_resource".into(),
            name: "a".into(),
            provider: "null".into(),
            inputs: [("k".to_string(), Value::String("old".into()))].into_iter().collect(),
            inputs_hash: "h".into(),
            outputs: [
                ("id".to_string(), Value::String("null-1".into())),
                ("k".to_string(), Value::String("old".into())),
            ]
            .into_iter()
            .collect(),
            dependencies: vec![],
        });

        let result = plan(&cfg, &state, &registry, &[]).await.unwrap();
        assert_eq!(result.summary.noop, 1);
        assert!(result.changes.is_empty());
    }

    #[tokio::test]
    async fn targeting_restricts_the_plan_to_the_target_and_its_dependencies() {
        let registry = registry_with_null();
        let mut subnet_props = BTreeMap::new();
        subnet_props.insert("vpcId".to_string(), Value::String("ptr://null:null_resource/vpc/id".into()));
        let vpc = resource("vpc", BTreeMap::new());
        let subnet = resource("subnet", subnet_props);
        let standalone = resource("standalone", BTreeMap::new());
        let cfg = Config { resources: vec![vpc, subnet, standalone], outputs: BTreeMap::new() };

        let result = plan(&cfg, &State::empty(), &registry, &["null_resource.subnet".to_string()]).await.unwrap();
        let addresses: HashSet<String> = result.changes.iter().map(|c| c.address.clone()).collect();
        assert!(addresses.contains("null_resource.subnet"));
        assert!(addresses.contains("null_resource.vpc"));
        assert!(!addresses.contains("null_resource.standalone"));
    }

    #[tokio::test]
    async fn unknown_provider_fails_before_any_provider_call() {
        let registry = ProviderRegistry::new();
        let cfg = Config { resources: vec![resource("a", BTreeMap::new())], outputs: BTreeMap::new() };
        let result = plan(&cfg, &State::empty(), &registry, &[]).await;
        assert!(matches!(result, Err(EngineError::Provider(_))));
    }
}
