//! Effect - A side effect described as a value
//!
//! Effects are produced by the differ and executed by the interpreter.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up a data source
    Read(Resource),
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update an existing resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Delete an existing resource
    Delete {
        resource: Resource,
        identifier: String,
    },
}

impl Effect {
    /// Identifier of the resource this effect touches
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } => id,
            Effect::Delete { resource, .. } => &resource.id,
        }
    }

    /// Returns true for effects that change infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Effect::Read(_) => "<=",
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Delete { .. } => "-",
        };
        write!(f, "{} {}", symbol, self.resource_id())
    }
}
