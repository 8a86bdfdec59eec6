//! Differ - Compare desired state with current state
//!
//! Compares the desired state declared in a stack with the current state
//! fetched from the Provider, and decides which Effect is required.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state.
///
/// Only desired attributes are compared: outputs the provider adds (ARNs,
/// endpoints) never count as drift. An unresolved reference always counts as
/// changed, since its eventual value is unknown.
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if desired_value.is_resolved() && current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("aws.iam.role", "eks-iam-role");
        let current = State::not_found(ResourceId::new("aws.iam.role", "eks-iam-role"));

        let result = diff(&desired, &current);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("aws.iam.role", "eks-iam-role")
            .with_attribute("name", "eks-iam-role");

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("eks-iam-role"));
        attrs.insert(
            "arn".to_string(),
            Value::string("arn:aws:iam::123456789012:role/eks-iam-role"),
        );
        let current = State::existing(ResourceId::new("aws.iam.role", "eks-iam-role"), attrs);

        let result = diff(&desired, &current);
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let scaling = |desired: i64| {
            Value::map([
                ("desired_size", Value::Int(desired)),
                ("min_size", Value::Int(1)),
                ("max_size", Value::Int(2)),
            ])
        };
        let desired = Resource::new("aws.eks.node_group", "eks-node-group")
            .with_attribute("scaling_config", scaling(2));

        let mut attrs = HashMap::new();
        attrs.insert("scaling_config".to_string(), scaling(1));
        let current = State::existing(
            ResourceId::new("aws.eks.node_group", "eks-node-group"),
            attrs,
        );

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => {
                assert_eq!(changed_attributes, vec!["scaling_config".to_string()]);
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn unresolved_reference_counts_as_change() {
        let desired = Resource::new("kubernetes.provider", "k8sprovider").with_attribute(
            "kubeconfig",
            Value::ResourceRef("kubeconfig".to_string(), "value".to_string()),
        );
        let mut attrs = HashMap::new();
        attrs.insert(
            "kubeconfig".to_string(),
            Value::ResourceRef("kubeconfig".to_string(), "value".to_string()),
        );
        let current = State::existing(desired.id.clone(), attrs);

        assert!(diff(&desired, &current).is_change());
    }

    #[test]
    fn internal_attributes_are_skipped() {
        let desired =
            Resource::new("aws.iam.role", "eks-iam-role").with_attribute("_note", "local only");
        let current = State::existing(desired.id.clone(), HashMap::new());

        assert!(!diff(&desired, &current).is_change());
    }
}
