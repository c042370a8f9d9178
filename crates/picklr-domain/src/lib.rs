mod config;
mod hash;
mod plan;
mod reference;
mod resource;
mod state;
mod value;

pub use config::Config;
pub use hash::hash_properties;
pub use plan::{ChangeAction, DiffAction, Plan, PlanMetadata, PlanSummary, PropertyDiff, ResourceChange};
pub use reference::{parse_reference_token, resolve as resolve_references, ReferenceToken};
pub use resource::{Lifecycle, Resource};
pub use state::{ResourceState, State};
pub use value::Value;
