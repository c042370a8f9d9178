use async_trait::async_trait;
use picklr_domain::State;

use crate::error::StoreError;

/// The uniform interface (§4.9) both the local filesystem state manager and
/// any remote object-store backend implement. The local (filesystem)
/// implementation ([`crate::local::LocalBackend`]) is the only one this
/// crate ships; a remote backend is a documented extension point (see
/// DESIGN.md), not a required concrete implementation.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the current state, or a fresh empty one if none has been
    /// written yet.
    async fn read(&self) -> Result<State, StoreError>;

    /// Serialize and persist `state`. Implementations increment the
    /// persisted `serial` by one relative to `state.serial` (§4.8) and
    /// write atomically (write-then-rename or equivalent).
    async fn write(&self, state: &State) -> Result<(), StoreError>;

    /// Acquire the cooperative lock, refusing with [`StoreError::StateLocked`]
    /// if another writer holds a live one.
    async fn lock(&self) -> Result<(), StoreError>;

    /// Release the lock, ignoring "not found".
    async fn unlock(&self) -> Result<(), StoreError>;
}
