//! Kubernetes resource schema definitions

use craftstack_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Returns the schema for a client context
pub fn client_context_schema() -> ResourceSchema {
    ResourceSchema::new("kubernetes.provider")
        .with_description("Connection to a Kubernetes API server")
        .attribute(
            AttributeSchema::new("kubeconfig", AttributeType::String)
                .required()
                .with_description("Kubeconfig document (YAML)"),
        )
}

/// Chart values: a map of free-form values
fn values() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::Any))
}

/// Returns the schema for a Helm release
pub fn helm_release_schema() -> ResourceSchema {
    ResourceSchema::new("kubernetes.helm_release")
        .with_description("A Helm chart release")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("chart", AttributeType::String).required())
        .attribute(AttributeSchema::new("version", AttributeType::String))
        .attribute(
            AttributeSchema::new("repository", AttributeType::String)
                .with_description("Chart repository URL"),
        )
        .attribute(AttributeSchema::new("namespace", AttributeType::String))
        .attribute(AttributeSchema::new("create_namespace", AttributeType::Bool))
        .attribute(AttributeSchema::new("values", values()))
        .attribute(
            AttributeSchema::new("kubeconfig", AttributeType::String)
                .required()
                .with_description("Kubeconfig of the target cluster"),
        )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![client_context_schema(), helm_release_schema()]
}
