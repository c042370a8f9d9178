mod applier;
mod diff;
pub mod error;
mod planner;
mod retry;

pub use applier::{apply, ApplyOutcome, ProgressEvent, ProgressStatus};
pub use diff::diff_properties;
pub use error::EngineError;
pub use planner::plan;
pub use retry::{with_retry, RetryConfig, RetryError};
