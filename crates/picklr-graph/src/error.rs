use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle detected{}", .address.as_ref().map(|a| format!(" involving '{a}'")).unwrap_or_default())]
    CycleDetected { address: Option<String> },

    #[error("resource '{0}' has both count and forEach set")]
    AmbiguousExpansion(String),
}
