//! EC2 resource schema definitions

use craftstack_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Protocol of a security group rule ("-1" means all traffic)
pub fn protocol() -> AttributeType {
    AttributeType::Enum(vec![
        "tcp".to_string(),
        "udp".to_string(),
        "icmp".to_string(),
        "-1".to_string(),
    ])
}

/// One ingress or egress rule
pub fn rule() -> AttributeType {
    AttributeType::Struct {
        name: "SecurityGroupRule".to_string(),
        fields: vec![
            AttributeSchema::new("protocol", protocol()).required(),
            AttributeSchema::new("from_port", types::port_number()).required(),
            AttributeSchema::new("to_port", types::port_number()).required(),
            AttributeSchema::new("cidr_blocks", AttributeType::List(Box::new(types::cidr())))
                .required(),
            AttributeSchema::new("description", AttributeType::String),
        ],
    }
}

/// Returns the schema for the default VPC lookup
pub fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new("aws.ec2.vpc")
        .with_description("Looks up the account's default VPC")
        .attribute(
            AttributeSchema::new("default", AttributeType::Bool)
                .required()
                .with_description("Select the default VPC"),
        )
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .with_description("VPC ID (read-only)"),
        )
}

/// Returns the schema for the subnet lookup
pub fn subnets_schema() -> ResourceSchema {
    ResourceSchema::new("aws.ec2.subnets")
        .with_description("Looks up every subnet of a VPC")
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_description("VPC whose subnets are listed"),
        )
        .attribute(
            AttributeSchema::new("ids", types::string_list())
                .with_description("Subnet IDs in the order EC2 returns them (read-only)"),
        )
}

/// Returns the schema for Security Group
pub fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws.ec2.security_group")
        .with_description("An AWS VPC Security Group")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("Group name, unique within the VPC"),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_description("VPC ID to create the security group in"),
        )
        .attribute(AttributeSchema::new("ingress", AttributeType::List(Box::new(rule()))))
        .attribute(AttributeSchema::new("egress", AttributeType::List(Box::new(rule()))))
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .with_description("Security Group ID (read-only, set after creation)"),
        )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![vpc_schema(), subnets_schema(), security_group_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftstack_core::resource::Value;
    use std::collections::HashMap;

    fn group(rules: Vec<Value>) -> HashMap<String, Value> {
        HashMap::from([
            ("name".to_string(), Value::string("eks-sg")),
            ("vpc_id".to_string(), Value::ResourceRef("vpc".into(), "id".into())),
            ("ingress".to_string(), Value::List(rules)),
        ])
    }

    fn rule(protocol: &str, port: i64, cidr: &str) -> Value {
        Value::map([
            ("protocol", Value::string(protocol)),
            ("from_port", Value::Int(port)),
            ("to_port", Value::Int(port)),
            ("cidr_blocks", Value::string_list([cidr])),
        ])
    }

    #[test]
    fn test_valid_security_group() {
        let schema = security_group_schema();
        assert!(schema.validate(&group(vec![rule("tcp", 25565, "0.0.0.0/0")])).is_ok());
        assert!(schema.validate(&group(vec![rule("-1", 0, "0.0.0.0/0")])).is_ok());
    }

    #[test]
    fn test_invalid_rules() {
        let schema = security_group_schema();
        assert!(schema.validate(&group(vec![rule("tcp", 70000, "0.0.0.0/0")])).is_err());
        assert!(schema.validate(&group(vec![rule("all", 0, "0.0.0.0/0")])).is_err());
        assert!(schema.validate(&group(vec![rule("tcp", 22, "0.0.0.0")])).is_err());
    }

    #[test]
    fn test_vpc_lookup_requires_default() {
        assert!(vpc_schema().validate(&HashMap::new()).is_err());
    }
}
