use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider '{0}' is not registered (no factory)")]
    UnknownProvider(String),

    #[error("provider '{0}' is registered but not yet loaded")]
    ProviderNotFound(String),

    #[error("failed to construct provider '{name}': {message}")]
    ProviderLoadError { name: String, message: String },

    #[error("plan failed for {address}: {message}")]
    PlanError { address: String, message: String },

    #[error("apply failed for {address}: {message}")]
    ApplyError { address: String, message: String },

    #[error("delete failed for {address}: {message}")]
    DeleteError { address: String, message: String },

    #[error("configure failed: {0}")]
    ConfigureError(String),

    #[error("malformed provider response for {address}: {message}")]
    MalformedResponse { address: String, message: String },
}
