use picklr_domain::Resource;

use crate::error::GraphError;

/// Lower `count`/`forEach` resources into concrete instances. Resources with
/// neither are passed through unchanged (a single clone). `lifecycle`,
/// `depends_on`, and the provider/type fields are carried onto every
/// instance unmodified; only `name` and `properties` vary per instance.
pub fn expand(resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
    let mut out = Vec::with_capacity(resources.len());
    for res in resources {
        if res.count.is_some() && res.for_each.is_some() {
            return Err(GraphError::AmbiguousExpansion(res.address()));
        }
        match (&res.count, &res.for_each) {
            (Some(n), None) => out.extend(expand_count(res, *n)),
            (None, Some(map)) if !map.is_empty() => out.extend(expand_for_each(res, map)),
            _ => out.push(res.clone()),
        }
    }
    Ok(out)
}

fn expand_count(res: &Resource, n: i64) -> Vec<Resource> {
    (0..n.max(0))
        .map(|i| {
            let mut clone = res.clone();
            clone.name = format!("{}[{}]", res.name, i);
            clone.properties = clone
                .properties
                .into_iter()
                .map(|(k, v)| (k, v.substitute("${count.index}", &i.to_string())))
                .collect();
            clone.count = None;
            clone
        })
        .collect()
}

fn expand_for_each(res: &Resource, map: &std::collections::BTreeMap<String, picklr_domain::Value>) -> Vec<Resource> {
    map.iter()
        .map(|(key, value)| {
            let mut clone = res.clone();
            clone.name = format!("{}[\"{}\"]", res.name, key);
            let value_str = value.display_string();
            clone.properties = clone
                .properties
                .into_iter()
                .map(|(k, v)| {
                    let v = v.substitute("${each.key}", key);
                    let v = v.substitute("${each.value}", &value_str);
                    (k, v)
                })
                .collect();
            clone.for_each = None;
            clone
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use picklr_domain::{Lifecycle, Value};

    use super::*;

    fn base(name: &str) -> Resource {
        Resource {
            r#type: "null_resource".into(),
            name: name.into(),
            provider: "null".into(),
            properties: BTreeMap::new(),
            depends_on: vec![],
            lifecycle: Lifecycle::default(),
            count: None,
            for_each: None,
            timeout: None,
        }
    }

    #[test]
    fn count_emits_n_clones_with_substituted_index() {
        let mut res = base("a");
        res.count = Some(3);
        res.properties.insert("tag".into(), Value::String("item-${count.index}".into()));

        let expanded = expand(&[res]).unwrap();
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0].name, "a[0]");
        assert_eq!(expanded[2].name, "a[2]");
        assert_eq!(expanded[1].properties["tag"], Value::String("item-1".into()));
    }

    #[test]
    fn for_each_emits_one_per_key_with_substitutions() {
        let mut res = base("b");
        let mut map = BTreeMap::new();
        map.insert("east".to_string(), Value::String("us-east-1".into()));
        map.insert("west".to_string(), Value::String("us-west-2".into()));
        res.for_each = Some(map);
        res.properties.insert(
            "region".into(),
            Value::String("${each.key}:${each.value}".into()),
        );

        let expanded = expand(&[res]).unwrap();
        assert_eq!(expanded.len(), 2);
        let names: Vec<_> = expanded.iter().map(|r| r.name.clone()).collect();
        assert!(names.contains(&"b[\"east\"]".to_string()));
        assert!(names.contains(&"b[\"west\"]".to_string()));

        let east = expanded.iter().find(|r| r.name == "b[\"east\"]").unwrap();
        assert_eq!(east.properties["region"], Value::String("east:us-east-1".into()));
    }

    #[test]
    fn resource_without_iteration_passes_through() {
        let res = base("plain");
        let expanded = expand(&[res.clone()]).unwrap();
        assert_eq!(expanded, vec![res]);
    }

    #[test]
    fn count_and_for_each_together_is_rejected() {
        let mut res = base("bad");
        res.count = Some(2);
        res.for_each = Some(BTreeMap::new());
        assert!(matches!(expand(&[res]), Err(GraphError::AmbiguousExpansion(_))));
    }

    #[test]
    fn substitution_does_not_rewrite_reference_tokens() {
        let mut res = base("c");
        res.count = Some(1);
        res.properties.insert("vpc".into(), Value::String("ptr://aws:EC2.Vpc/v/id".into()));
        let expanded = expand(&[res]).unwrap();
        assert_eq!(expanded[0].properties["vpc"], Value::String("ptr://aws:EC2.Vpc/v/id".into()));
    }
}
