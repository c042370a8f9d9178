use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use picklr_domain::{parse_reference_token, ReferenceToken, Resource, ResourceState, Value};

use crate::error::GraphError;

/// A directed acyclic graph over resource addresses, with a creation order
/// (topological) and its exact reverse as the destruction order.
pub struct Graph {
    creation_order: Vec<String>,
    destruction_order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl Graph {
    /// Build from an already-expanded resource list. Edges come from
    /// `depends_on` plus implicit `ptr://` references inside `properties`,
    /// restricted to targets that exist in the resource set.
    pub fn build(resources: &[Resource]) -> Result<Graph, GraphError> {
        let addresses: HashSet<String> = resources.iter().map(Resource::address).collect();
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();

        for res in resources {
            let mut deps: Vec<String> = Vec::new();
            for d in &res.depends_on {
                if addresses.contains(d) && !deps.contains(d) {
                    deps.push(d.clone());
                }
            }

            let mut tokens = Vec::new();
            collect_reference_tokens(&Value::Map(res.properties.clone()), &mut tokens);
            for token in tokens {
                if let Some(target) =
                    resources.iter().find(|r| token.matches(&r.provider, &r.r#type, &r.name))
                {
                    let addr = target.address();
                    if !deps.contains(&addr) {
                        deps.push(addr);
                    }
                }
            }

            dependencies.insert(res.address(), deps);
        }

        Self::from_dependencies(dependencies, addresses)
    }

    /// Build from prior state alone (used when destroying resources that no
    /// longer appear in config). Dependency targets absent from the state's
    /// own address set are added as standalone nodes.
    pub fn build_from_state(states: &[ResourceState]) -> Result<Graph, GraphError> {
        let mut addresses: HashSet<String> = states.iter().map(ResourceState::address).collect();
        for s in states {
            addresses.extend(s.dependencies.iter().cloned());
        }

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for addr in &addresses {
            dependencies.insert(addr.clone(), Vec::new());
        }
        for s in states {
            dependencies.insert(s.address(), s.dependencies.clone());
        }

        Self::from_dependencies(dependencies, addresses)
    }

    fn from_dependencies(
        dependencies: HashMap<String, Vec<String>>,
        addresses: HashSet<String>,
    ) -> Result<Graph, GraphError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut node_ix: HashMap<String, NodeIndex> = HashMap::new();
        for addr in &addresses {
            node_ix.insert(addr.clone(), graph.add_node(addr.clone()));
        }
        for (addr, deps) in &dependencies {
            let to = node_ix[addr];
            for dep in deps {
                graph.add_edge(node_ix[dep], to, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| GraphError::CycleDetected {
            address: graph.node_weight(cycle.node_id()).cloned(),
        })?;
        let creation_order: Vec<String> = order.into_iter().map(|ix| graph[ix].clone()).collect();
        let mut destruction_order = creation_order.clone();
        destruction_order.reverse();

        Ok(Graph { creation_order, destruction_order, dependencies })
    }

    pub fn creation_order(&self) -> &[String] {
        &self.creation_order
    }

    pub fn destruction_order(&self) -> &[String] {
        &self.destruction_order
    }

    pub fn dependencies(&self, address: &str) -> &[String] {
        self.dependencies.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transitive_deps(&self, address: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = self.dependencies(address).to_vec();
        while let Some(addr) = stack.pop() {
            if seen.insert(addr.clone()) {
                stack.extend(self.dependencies(&addr).iter().cloned());
            }
        }
        seen
    }
}

fn collect_reference_tokens(value: &Value, out: &mut Vec<ReferenceToken>) {
    match value {
        Value::String(s) if value.is_reference_token() => {
            if let Some(token) = parse_reference_token(s) {
                out.push(token);
            }
        }
        Value::Seq(items) => items.iter().for_each(|v| collect_reference_tokens(v, out)),
        Value::Map(map) => map.values().for_each(|v| collect_reference_tokens(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use picklr_domain::Lifecycle;

    use super::*;

    fn resource(r#type: &str, name: &str, depends_on: Vec<&str>, properties: BTreeMap<String, Value>) -> Resource {
        Resource {
            r#type: r#type.into(),
            name: name.into(),
            provider: "aws".into(),
            properties,
            depends_on: depends_on.into_iter().map(String::from).collect(),
            lifecycle: Lifecycle::default(),
            count: None,
            for_each: None,
            timeout: None,
        }
    }

    #[test]
    fn explicit_depends_on_orders_nodes() {
        let a = resource("t", "a", vec![], BTreeMap::new());
        let b = resource("t", "b", vec!["t.a"], BTreeMap::new());
        let graph = Graph::build(&[b, a]).unwrap();
        let pos_a = graph.creation_order().iter().position(|n| n == "t.a").unwrap();
        let pos_b = graph.creation_order().iter().position(|n| n == "t.b").unwrap();
        assert!(pos_a < pos_b);
        assert_eq!(graph.destruction_order()[0], "t.b");
    }

    #[test]
    fn implicit_reference_orders_nodes() {
        let vpc = resource("aws:EC2.Vpc", "v", vec![], BTreeMap::new());
        let mut props = BTreeMap::new();
        props.insert("vpcId".to_string(), Value::String("ptr://aws:EC2.Vpc/v/id".into()));
        let subnet = resource("aws:EC2.Subnet", "s", vec![], props);

        let graph = Graph::build(&[subnet, vpc]).unwrap();
        let pos_vpc = graph.creation_order().iter().position(|n| n == "aws:EC2.Vpc.v").unwrap();
        let pos_subnet = graph.creation_order().iter().position(|n| n == "aws:EC2.Subnet.s").unwrap();
        assert!(pos_vpc < pos_subnet);
        assert_eq!(graph.dependencies("aws:EC2.Subnet.s"), ["aws:EC2.Vpc.v"]);
    }

    #[test]
    fn implicit_reference_orders_nodes_when_type_is_bare() {
        let vpc = resource("null_resource", "vpc", vec![], BTreeMap::new());
        let mut props = BTreeMap::new();
        props.insert("vpcId".to_string(), Value::String("ptr://aws:null_resource/vpc/id".into()));
        let subnet = resource("null_resource", "subnet", vec![], props);

        let graph = Graph::build(&[subnet, vpc]).unwrap();
        assert_eq!(graph.dependencies("null_resource.subnet"), ["null_resource.vpc"]);
    }

    #[test]
    fn cycle_is_detected() {
        let a = resource("t", "a", vec!["t.b"], BTreeMap::new());
        let b = resource("t", "b", vec!["t.a"], BTreeMap::new());
        let result = Graph::build(&[a, b]);
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn transitive_deps_follows_the_full_chain() {
        let a = resource("t", "a", vec![], BTreeMap::new());
        let b = resource("t", "b", vec!["t.a"], BTreeMap::new());
        let c = resource("t", "c", vec!["t.b"], BTreeMap::new());
        let graph = Graph::build(&[a, b, c]).unwrap();
        let deps = graph.transitive_deps("t.c");
        assert!(deps.contains("t.a"));
        assert!(deps.contains("t.b"));
    }

    #[test]
    fn references_to_unknown_addresses_are_ignored() {
        let mut props = BTreeMap::new();
        props.insert("x".to_string(), Value::String("ptr://aws:EC2.Vpc/missing/id".into()));
        let a = resource("t", "a", vec![], props);
        let graph = Graph::build(&[a]).unwrap();
        assert!(graph.dependencies("t.a").is_empty());
    }

    #[test]
    fn build_from_state_adds_standalone_nodes_for_missing_dependencies() {
        let state = ResourceState {
            r#type: "t".into(),
            name: "b".into(),
            provider: "null".into(),
            inputs: BTreeMap::new(),
            inputs_hash: "h".into(),
            outputs: BTreeMap::new(),
            dependencies: vec!["t.a".to_string()],
        };
        let graph = Graph::build_from_state(&[state]).unwrap();
        assert_eq!(graph.destruction_order(), ["t.b", "t.a"]);
    }
}
