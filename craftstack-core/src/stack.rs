//! Stack - Declaring resources and the values wired between them
//!
//! A `Stack` records declarations in program order. Each declaration returns a
//! `Handle` whose outputs are `ResourceRef` values: they stay unresolved until
//! the engine has read or created the resource they point at.
//!
//! Values computed from other outputs are declared with [`Stack::all`], a join
//! over several handles: the function given to [`All::apply`] runs once per
//! run, after every input has resolved.

use std::fmt;
use std::sync::Arc;

use crate::error::ApplyError;
use crate::graph::{Dependency, DependencyGraph, EXPLICIT_DEPENDENCY};
use crate::resource::{Resource, Value};
use crate::schema::ResourceSchema;

/// Attribute under which a derived value publishes its result
pub const DERIVED_VALUE: &str = "value";

/// Pure transform over resolved inputs
pub type Transform = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A value computed from other bindings' outputs
#[derive(Clone)]
pub struct DerivedValue {
    pub name: String,
    pub inputs: Vec<Value>,
    pub transform: Transform,
}

impl DerivedValue {
    /// Run the transform over resolved inputs
    pub fn evaluate(&self, inputs: &[Value]) -> Result<Value, ApplyError> {
        (self.transform)(inputs).map_err(|message| ApplyError::Coercion {
            binding: self.name.clone(),
            message,
        })
    }
}

impl fmt::Debug for DerivedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedValue")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// A declaration in the stack
#[derive(Debug, Clone)]
pub enum Declaration {
    Resource(Resource),
    Derived(DerivedValue),
}

impl Declaration {
    pub fn binding(&self) -> &str {
        match self {
            Declaration::Resource(r) => r.binding(),
            Declaration::Derived(d) => &d.name,
        }
    }
}

/// Output handle of a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    binding: String,
}

impl Handle {
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Reference to one of this declaration's attributes
    pub fn output(&self, attribute: &str) -> Value {
        Value::ResourceRef(self.binding.clone(), attribute.to_string())
    }

    /// Reference to the result of a derived value
    pub fn value(&self) -> Value {
        self.output(DERIVED_VALUE)
    }
}

/// Declarations in program order
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    declarations: Vec<Declaration>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a data source (looked up, never created)
    pub fn data(&mut self, resource: Resource) -> Handle {
        self.push(Declaration::Resource(resource.with_read_only(true)))
    }

    /// Declare a managed resource
    pub fn resource(&mut self, resource: Resource) -> Handle {
        self.push(Declaration::Resource(resource))
    }

    /// Join several outputs; see [`All::apply`]
    pub fn all(&mut self, inputs: impl IntoIterator<Item = Value>) -> All<'_> {
        All {
            stack: self,
            inputs: inputs.into_iter().collect(),
        }
    }

    fn push(&mut self, declaration: Declaration) -> Handle {
        let handle = Handle {
            binding: declaration.binding().to_string(),
        };
        self.declarations.push(declaration);
        handle
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Resource(r) => Some(r),
            Declaration::Derived(_) => None,
        })
    }

    pub fn find(&self, binding: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.binding() == binding)
    }

    pub fn find_resource(&self, binding: &str) -> Option<&Resource> {
        self.resources().find(|r| r.binding() == binding)
    }

    /// Resources of one type, in declaration order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources()
            .filter(move |r| r.id.resource_type == resource_type)
    }

    /// Build the dependency graph of all declarations
    pub fn graph(&self) -> Result<DependencyGraph, ApplyError> {
        let mut graph = DependencyGraph::new();
        for declaration in &self.declarations {
            graph.add_node(declaration.binding())?;
        }

        for declaration in &self.declarations {
            let from = declaration.binding();
            match declaration {
                Declaration::Resource(resource) => {
                    let mut keys: Vec<&String> = resource.attributes.keys().collect();
                    keys.sort();
                    for key in keys {
                        graph.add_references(from, key, &resource.attributes[key]);
                    }
                    for target in &resource.depends_on {
                        graph.add_edge(
                            from.to_string(),
                            Dependency {
                                target: target.clone(),
                                attribute: String::new(),
                                used_in: EXPLICIT_DEPENDENCY.to_string(),
                            },
                        );
                    }
                }
                Declaration::Derived(derived) => {
                    for (i, input) in derived.inputs.iter().enumerate() {
                        graph.add_references(from, &format!("input[{}]", i), input);
                    }
                }
            }
        }

        graph.check_targets()?;
        Ok(graph)
    }

    /// Validate every resource against the schema for its type.
    /// Resource types without a schema are accepted as-is.
    pub fn validate(&self, schemas: &[ResourceSchema]) -> Result<(), ApplyError> {
        let mut errors = Vec::new();
        for resource in self.resources() {
            if let Some(schema) = schemas
                .iter()
                .find(|s| s.resource_type == resource.id.resource_type)
                && let Err(type_errors) = schema.validate(&resource.attributes)
            {
                for error in type_errors {
                    errors.push(format!("{}: {}", resource.id, error));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApplyError::Validation(errors))
        }
    }
}

/// Pending join over several outputs
pub struct All<'a> {
    stack: &'a mut Stack,
    inputs: Vec<Value>,
}

impl All<'_> {
    /// Register `transform` to run once all inputs have resolved.
    /// Returns the handle of the derived value; use [`Handle::value`].
    pub fn apply<F>(self, name: impl Into<String>, transform: F) -> Handle
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.stack.push(Declaration::Derived(DerivedValue {
            name: name.into(),
            inputs: self.inputs,
            transform: Arc::new(transform),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stack() -> Stack {
        let mut stack = Stack::new("test");
        let vpc = stack.data(Resource::new("aws.ec2.vpc", "vpc").with_attribute("default", true));
        let subnets = stack.data(
            Resource::new("aws.ec2.subnets", "subnets").with_attribute("vpc_id", vpc.output("id")),
        );
        let cluster = stack.resource(
            Resource::new("aws.eks.cluster", "cluster")
                .with_attribute("subnet_ids", subnets.output("ids")),
        );
        let joined = stack.all([cluster.output("name"), cluster.output("endpoint")]).apply(
            "joined",
            |inputs| {
                let parts: Vec<&str> = inputs.iter().filter_map(Value::as_str).collect();
                Ok(Value::String(parts.join("@")))
            },
        );
        stack.resource(
            Resource::new("kubernetes.provider", "client")
                .with_attribute("kubeconfig", joined.value())
                .with_depends_on("cluster"),
        );
        stack
    }

    #[test]
    fn data_marks_read_only() {
        let stack = sample_stack();
        assert!(stack.find_resource("vpc").unwrap().is_data_source());
        assert!(!stack.find_resource("cluster").unwrap().is_data_source());
    }

    #[test]
    fn graph_orders_declarations() {
        let stack = sample_stack();
        let order = stack.graph().unwrap().topological_order().unwrap();
        assert_eq!(order, vec!["vpc", "subnets", "cluster", "joined", "client"]);
    }

    #[test]
    fn explicit_dependency_is_recorded() {
        let stack = sample_stack();
        let graph = stack.graph().unwrap();
        let explicit: Vec<_> = graph
            .dependencies_of("client")
            .iter()
            .filter(|d| d.is_explicit())
            .map(|d| d.target.as_str())
            .collect();
        assert_eq!(explicit, vec!["cluster"]);
    }

    #[test]
    fn derived_value_runs_transform() {
        let stack = sample_stack();
        let Some(Declaration::Derived(derived)) = stack.find("joined") else {
            panic!("Expected derived value");
        };
        let value = derived
            .evaluate(&[Value::string("c"), Value::string("https://x")])
            .unwrap();
        assert_eq!(value, Value::string("c@https://x"));
    }

    #[test]
    fn duplicate_binding_fails_graph() {
        let mut stack = Stack::new("dup");
        stack.resource(Resource::new("aws.iam.role", "role"));
        stack.resource(Resource::new("aws.iam.role", "role"));
        assert!(matches!(
            stack.graph(),
            Err(ApplyError::DuplicateBinding(_))
        ));
    }

    #[test]
    fn undeclared_dependency_fails_graph() {
        let mut stack = Stack::new("dangling");
        stack.resource(Resource::new("kubernetes.provider", "client").with_depends_on("nodes"));
        assert!(matches!(
            stack.graph(),
            Err(ApplyError::UnknownBinding { .. })
        ));
    }
}
