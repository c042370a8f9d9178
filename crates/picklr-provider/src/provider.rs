use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Mirrors `picklr_domain::ChangeAction`, but this crate never depends on
/// `picklr-domain` — every value crossing the provider boundary is plain
/// JSON, per the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderAction {
    Create,
    Update,
    Replace,
    Delete,
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub action: ProviderAction,
    #[serde(default)]
    pub changed_attributes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub new_state_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub exists: bool,
    pub new_state_json: serde_json::Value,
}

/// The capability set every provider exposes. All payloads cross the
/// boundary as serialized JSON, so a provider can live in another process
/// or another language behind a thin shim without changing this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Provider-level settings. Must be idempotent: calling it twice with
    /// the same settings produces the same diagnostics and leaves the
    /// provider in the same configured state.
    async fn configure(&self, settings: serde_json::Value) -> Result<Vec<String>, ProviderError>;

    /// Schema text and a version string, used by conformance and by
    /// embedders that want to validate configuration ahead of `plan`.
    async fn get_schema(&self) -> Result<(String, String), ProviderError>;

    async fn plan(
        &self,
        r#type: &str,
        name: &str,
        desired_json: Option<serde_json::Value>,
        prior_json: Option<serde_json::Value>,
    ) -> Result<PlanResponse, ProviderError>;

    async fn apply(
        &self,
        r#type: &str,
        name: &str,
        desired_json: serde_json::Value,
        prior_json: Option<serde_json::Value>,
    ) -> Result<ApplyResponse, ProviderError>;

    async fn read(
        &self,
        r#type: &str,
        id: &str,
        current_state_json: Option<serde_json::Value>,
    ) -> Result<ReadResponse, ProviderError>;

    async fn delete(
        &self,
        r#type: &str,
        id: &str,
        current_state_json: Option<serde_json::Value>,
    ) -> Result<(), ProviderError>;
}
