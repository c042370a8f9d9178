//! The per-attribute diff algorithm (§4.4.1).

use std::collections::BTreeMap;

use picklr_domain::{DiffAction, PropertyDiff, Value};

/// Structural diff of `prior` against `desired`. Equality is `Value`'s
/// derived `PartialEq`, which compares `Map` as a `BTreeMap` — order-
/// insensitive by construction, not by a stringified-form comparison (see
/// DESIGN.md for why this corrects rather than reproduces the order-
/// sensitivity bug §9 of the spec flags in the original).
///
/// `sensitive` and `forces_replacement` are always `false` here: this is a
/// purely structural diff with no access to provider schema metadata (which
/// attributes are sensitive or force-replace). A provider wanting those
/// annotated would need to enrich this map itself.
pub fn diff_properties(
    prior: &BTreeMap<String, Value>,
    desired: &BTreeMap<String, Value>,
) -> BTreeMap<String, PropertyDiff> {
    let mut diff = BTreeMap::new();

    for (key, after) in desired {
        match prior.get(key) {
            None => {
                diff.insert(
                    key.clone(),
                    PropertyDiff {
                        before: None,
                        after: Some(after.clone()),
                        sensitive: false,
                        forces_replacement: false,
                        action: DiffAction::Create,
                    },
                );
            }
            Some(before) if before != after => {
                diff.insert(
                    key.clone(),
                    PropertyDiff {
                        before: Some(before.clone()),
                        after: Some(after.clone()),
                        sensitive: false,
                        forces_replacement: false,
                        action: DiffAction::Update,
                    },
                );
            }
            _ => {}
        }
    }

    for (key, before) in prior {
        if !desired.contains_key(key) {
            diff.insert(
                key.clone(),
                PropertyDiff {
                    before: Some(before.clone()),
                    after: None,
                    sensitive: false,
                    forces_replacement: false,
                    action: DiffAction::Delete,
                },
            );
        }
    }

    diff
}
