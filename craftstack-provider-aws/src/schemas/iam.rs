//! IAM resource schema definitions

use craftstack_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for IAM Role
pub fn role_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.role")
        .with_description("An IAM role assumable by a service principal")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Role name"),
        )
        .attribute(
            AttributeSchema::new("assume_role_policy", types::json_document())
                .required()
                .with_description("Trust policy document (JSON)"),
        )
        .attribute(
            AttributeSchema::new("arn", types::arn())
                .with_description("Role ARN (read-only)"),
        )
}

/// Returns the schema for IAM Role Policy Attachment
pub fn role_policy_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("aws.iam.role_policy_attachment")
        .with_description("Attaches a managed policy to a role")
        .attribute(
            AttributeSchema::new("role", AttributeType::String)
                .required()
                .with_description("Role name"),
        )
        .attribute(
            AttributeSchema::new("policy_arn", types::arn())
                .required()
                .with_description("Managed policy ARN"),
        )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![role_schema(), role_policy_attachment_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftstack_core::resource::Value;
    use std::collections::HashMap;

    #[test]
    fn test_role_requires_json_policy() {
        let schema = role_schema();
        let mut attrs = HashMap::from([
            ("name".to_string(), Value::string("eks-iam-role")),
            (
                "assume_role_policy".to_string(),
                Value::string(r#"{"Version":"2012-10-17","Statement":[]}"#),
            ),
        ]);
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("assume_role_policy".to_string(), Value::string("{not json"));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn test_attachment_requires_arn() {
        let schema = role_policy_attachment_schema();
        let attrs = HashMap::from([
            ("role".to_string(), Value::string("node-iam-role")),
            ("policy_arn".to_string(), Value::string("AmazonEKS_CNI_Policy")),
        ]);
        assert!(schema.validate(&attrs).is_err());
    }
}
