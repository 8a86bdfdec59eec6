//! Error - Failures that abort a plan, apply or destroy run

use thiserror::Error;

use crate::provider::ProviderError;
use crate::resource::ResourceId;

/// Errors returned by the engine.
///
/// None of these are retried: every failure is handed back to the caller and
/// the run stops where it is.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A data source lookup found nothing (e.g., no default VPC)
    #[error("[{0}] lookup returned no result")]
    LookupNotFound(ResourceId),

    /// A provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A derived value received an input of unexpected shape
    #[error("derived value '{binding}': {message}")]
    Coercion { binding: String, message: String },

    /// A reference could not be resolved when its resource had to be materialized
    #[error("[{id}] unresolved reference to {binding}.{attribute}")]
    UnresolvedReference {
        id: ResourceId,
        binding: String,
        attribute: String,
    },

    /// A reference or explicit dependency names a binding that was never declared
    #[error("'{from}' depends on undeclared binding '{binding}'")]
    UnknownBinding { from: String, binding: String },

    /// Two declarations share a binding name
    #[error("binding '{0}' is declared more than once")]
    DuplicateBinding(String),

    /// The dependency graph is not acyclic
    #[error("dependency cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// Schema validation failed before any provider call
    #[error("validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_not_found_display() {
        let err = ApplyError::LookupNotFound(ResourceId::new("aws.ec2.vpc", "default-vpc"));
        assert_eq!(
            err.to_string(),
            "[aws.ec2.vpc.default-vpc] lookup returned no result"
        );
    }

    #[test]
    fn provider_error_is_transparent() {
        let err: ApplyError = ProviderError::new("throttled")
            .for_resource(ResourceId::new("aws.iam.role", "eks-iam-role"))
            .into();
        assert_eq!(err.to_string(), "[aws.iam.role.eks-iam-role] throttled");
    }

    #[test]
    fn cycle_lists_members() {
        let err = ApplyError::Cycle(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "dependency cycle involving: a, b");
    }
}
