//! Concrete record kinds managed by the settings layer.

pub mod agent;
pub mod role;

pub use agent::{
    AgentFields, AgentInput, AgentMapper, AgentStore, AgentValidator, AgentsDocument, ModelRef,
    PersistedAgent,
};
pub use role::{
    PersistedRole, RoleFields, RoleInput, RoleMapper, RoleStore, RoleValidator, RolesDocument,
};

use crate::core::FieldError;

/// Version written into every persisted settings document.
pub const DOCUMENT_VERSION: u32 = 1;

/// Trims `value` and checks it against `max_chars`, recording problems under `path`.
pub(crate) fn bounded_text(
    path: &str,
    value: &str,
    max_chars: usize,
    required: bool,
    errors: &mut Vec<FieldError>,
) -> String {
    let trimmed = value.trim();
    if required && trimmed.is_empty() {
        errors.push(FieldError::new(path, "is required"));
    }
    let chars = trimmed.chars().count();
    if chars > max_chars {
        errors.push(FieldError::new(
            path,
            format!("must be at most {max_chars} characters (got {chars})"),
        ));
    }
    trimmed.to_string()
}
