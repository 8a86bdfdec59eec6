//! EKS resource schema definitions

use craftstack_core::resource::Value;
use craftstack_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Cluster networking
pub fn vpc_config() -> AttributeType {
    AttributeType::Struct {
        name: "VpcConfig".to_string(),
        fields: vec![
            AttributeSchema::new("subnet_ids", types::string_list()).required(),
            AttributeSchema::new("security_group_ids", types::string_list()),
            AttributeSchema::new("public_access_cidrs", AttributeType::List(Box::new(types::cidr()))),
        ],
    }
}

/// Node group sizes; requires min_size <= desired_size <= max_size
pub fn scaling_config() -> AttributeType {
    AttributeType::Custom {
        name: "ScalingConfig".to_string(),
        base: Box::new(AttributeType::Struct {
            name: "ScalingConfig".to_string(),
            fields: vec![
                AttributeSchema::new("desired_size", types::non_negative_int()).required(),
                AttributeSchema::new("min_size", types::non_negative_int()).required(),
                AttributeSchema::new("max_size", types::non_negative_int()).required(),
            ],
        }),
        validate: |value| {
            let size = |key: &str| value.get(key).and_then(Value::as_int);
            match (size("min_size"), size("desired_size"), size("max_size")) {
                (Some(min), Some(desired), Some(max)) if !(min <= desired && desired <= max) => {
                    Err(format!(
                        "Scaling must satisfy min_size <= desired_size <= max_size (got {} <= {} <= {})",
                        min, desired, max
                    ))
                }
                _ => Ok(()),
            }
        },
    }
}

/// Returns the schema for EKS Cluster
pub fn cluster_schema() -> ResourceSchema {
    ResourceSchema::new("aws.eks.cluster")
        .with_description("A managed EKS control plane")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Cluster name"),
        )
        .attribute(
            AttributeSchema::new("role_arn", types::arn())
                .required()
                .with_description("Role the control plane assumes"),
        )
        .attribute(AttributeSchema::new("vpc_config", vpc_config()).required())
        .attribute(AttributeSchema::new("tags", AttributeType::Map(Box::new(AttributeType::String))))
        .attribute(
            AttributeSchema::new("endpoint", AttributeType::String)
                .with_description("API server endpoint (read-only)"),
        )
        .attribute(
            AttributeSchema::new(
                "certificate_authority",
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .with_description("Cluster CA; `data` holds the base64 certificate (read-only)"),
        )
}

/// Returns the schema for EKS Node Group
pub fn node_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.eks.node_group")
        .with_description("A managed group of worker nodes")
        .attribute(
            AttributeSchema::new("cluster_name", AttributeType::String)
                .required()
                .with_description("Cluster the nodes join"),
        )
        .attribute(
            AttributeSchema::new("node_group_name", AttributeType::String)
                .required()
                .with_description("Node group name, unique within the cluster"),
        )
        .attribute(
            AttributeSchema::new("node_role_arn", types::arn())
                .required()
                .with_description("Role the worker nodes assume"),
        )
        .attribute(AttributeSchema::new("subnet_ids", types::string_list()).required())
        .attribute(AttributeSchema::new("scaling_config", scaling_config()).required())
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![cluster_schema(), node_group_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaling(desired: i64, min: i64, max: i64) -> Value {
        Value::map([
            ("desired_size", Value::Int(desired)),
            ("min_size", Value::Int(min)),
            ("max_size", Value::Int(max)),
        ])
    }

    #[test]
    fn test_scaling_bounds() {
        let t = scaling_config();
        assert!(t.validate(&scaling(2, 1, 2)).is_ok());
        assert!(t.validate(&scaling(3, 1, 2)).is_err());
        assert!(t.validate(&scaling(1, 2, 3)).is_err());
        assert!(t.validate(&scaling(-1, -1, 2)).is_err());
    }

    #[test]
    fn test_scaling_requires_all_sizes() {
        let partial = Value::map([("desired_size", Value::Int(2))]);
        assert!(scaling_config().validate(&partial).is_err());
    }

    #[test]
    fn test_vpc_config_rejects_bad_cidr() {
        let config = Value::map([
            ("subnet_ids", Value::string_list(["subnet-1"])),
            ("public_access_cidrs", Value::string_list(["everywhere"])),
        ]);
        assert!(vpc_config().validate(&config).is_err());
    }
}
