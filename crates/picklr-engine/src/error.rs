use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Surfaces whatever the embedder's config evaluator reported; this
    /// engine has no parser of its own for the resource-configuration
    /// language (§7: out of scope, handled by an external collaborator).
    #[error("config error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(#[from] picklr_provider::ProviderError),

    #[error("graph error: {0}")]
    Graph(#[from] picklr_graph::GraphError),

    #[error("store error: {0}")]
    Store(#[from] picklr_store::StoreError),

    #[error("resource '{0}' has preventDestroy set and the plan requires destroying it")]
    PreventDestroyViolation(String),

    #[error("plan failed for {address}: {message}")]
    PlanError { address: String, message: String },

    #[error("apply cancelled")]
    Cancelled,

    #[error("apply completed with errors: {0:?}")]
    Aggregate(Vec<String>),
}
