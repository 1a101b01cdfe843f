mod builtin;
mod provider;
mod registry;
mod selector;
mod spec;

pub use provider::{ModelKind, Provider};
pub use registry::ModelRegistry;
pub use selector::{ModelSelector, Selection};
pub use spec::{ModelId, ModelSpec};
