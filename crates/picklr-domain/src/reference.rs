/// A parsed `ptr://<provider>:<type>/<name>/<attr>` reference token.
///
/// `provider`, `type_`, and `name` never contain `/`; `attr` may contain `.`
/// but not `/` (it can itself be a dotted path into a nested output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken {
    pub provider: String,
    pub type_: String,
    pub name: String,
    pub attr: String,
}

impl ReferenceToken {
    /// True if a resource with the given `provider`/`type`/`name` is the one
    /// this token names. `type` is compared two ways: against the token's
    /// bare `type_` as parsed, and against `type_` with the provider folded
    /// back in (`"<provider>:<type_>"`) — resources are free to spell their
    /// own `type` field either bare (`"EC2.Vpc"`) or provider-qualified
    /// (`"aws:EC2.Vpc"`), and a token can only ever carry one `:` split, so
    /// both conventions have to resolve to the same resource.
    pub fn matches(&self, provider: &str, r#type: &str, name: &str) -> bool {
        self.provider == provider
            && self.name == name
            && (self.type_ == r#type || format!("{}:{}", self.provider, self.type_) == r#type)
    }
}

/// Parse a string as a reference token. Returns `None` if it doesn't start
/// with the `ptr://` prefix or doesn't have the required `<prov>:<type>/<name>/<attr>` shape.
pub fn parse_reference_token(s: &str) -> Option<ReferenceToken> {
    let rest = s.strip_prefix("ptr://")?;
    let (provider_and_type, rest) = rest.split_once('/')?;
    let (provider, type_) = provider_and_type.split_once(':')?;
    let (name, attr) = rest.split_once('/')?;
    if provider.is_empty() || type_.is_empty() || name.is_empty() || attr.is_empty() {
        return None;
    }
    Some(ReferenceToken {
        provider: provider.to_string(),
        type_: type_.to_string(),
        name: name.to_string(),
        attr: attr.to_string(),
    })
}

/// Recursively resolve every `ptr://` reference-token leaf inside `value`
/// against `state`: find the first resource state whose `(provider, type,
/// name)` matches the token, then look the attribute up in its `outputs`
/// first and `inputs` second. A dotted `attr` descends into nested
/// mappings. Unresolvable tokens (no matching resource, missing attribute)
/// are left unchanged rather than erroring — callers may be resolving
/// against state that hasn't caught up yet.
pub fn resolve(value: &crate::value::Value, state: &crate::state::State) -> crate::value::Value {
    use crate::value::Value;

    match value {
        Value::String(s) if value.is_reference_token() => {
            match parse_reference_token(s).and_then(|token| resolve_token(&token, state)) {
                Some(resolved) => resolved,
                None => value.clone(),
            }
        }
        Value::Seq(items) => Value::Seq(items.iter().map(|v| resolve(v, state)).collect()),
        Value::Map(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), resolve(v, state))).collect())
        }
        other => other.clone(),
    }
}

fn resolve_token(token: &ReferenceToken, state: &crate::state::State) -> Option<crate::value::Value> {
    let resource = state.resources.iter().find(|r| token.matches(&r.provider, &r.r#type, &r.name))?;
    lookup_attr(&resource.outputs, &token.attr).or_else(|| lookup_attr(&resource.inputs, &token.attr)).cloned()
}

fn lookup_attr<'a>(
    map: &'a std::collections::BTreeMap<String, crate::value::Value>,
    attr: &str,
) -> Option<&'a crate::value::Value> {
    let mut parts = attr.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}
