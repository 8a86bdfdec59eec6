//! Resource - Representing resources and their state

use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "aws.iam.role", "kubernetes.helm_release")
    pub resource_type: String,
    /// Logical name, also used as the binding name for references
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Provider prefix of the resource type ("aws" for "aws.eks.cluster")
    pub fn provider(&self) -> &str {
        self.resource_type
            .split('.')
            .next()
            .unwrap_or(&self.resource_type)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another binding's attribute (binding_name, attribute_name).
    /// Unresolved until the engine has read or created the referenced binding.
    ResourceRef(String, String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Strings of a list value, skipping non-string items
    pub fn strings(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if no ResourceRef remains anywhere inside this value
    pub fn is_resolved(&self) -> bool {
        match self {
            Value::ResourceRef(_, _) => false,
            Value::List(items) => items.iter().all(Value::is_resolved),
            Value::Map(map) => map.values().all(Value::is_resolved),
            _ => true,
        }
    }

    /// Convert to JSON. Unresolved references have no JSON form.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::String(s) => Some(serde_json::Value::String(s.clone())),
            Value::Int(n) => Some(serde_json::Value::from(*n)),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::List(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Value::ResourceRef(_, _) => None,
        }
    }

    /// Convert from JSON. Nulls are dropped from lists and maps.
    /// Numbers that are not integers are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => Some(
                n.as_i64()
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::String(n.to_string())),
            ),
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
            serde_json::Value::Null => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Desired state of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
    /// Bindings that must be materialized first, in addition to those
    /// implied by references in `attributes`
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_depends_on(mut self, binding: impl Into<String>) -> Self {
        self.depends_on.push(binding.into());
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Name other declarations use to reference this resource
    pub fn binding(&self) -> &str {
        &self.id.name
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-side identifier (e.g., vpc-xxx, role name, cluster:nodegroup)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_prefix() {
        let id = ResourceId::new("aws.eks.cluster", "eks-cluster");
        assert_eq!(id.provider(), "aws");
        assert_eq!(id.to_string(), "aws.eks.cluster.eks-cluster");
    }

    #[test]
    fn nested_reference_is_unresolved() {
        let value = Value::map([(
            "subnet_ids",
            Value::ResourceRef("subnets".to_string(), "ids".to_string()),
        )]);
        assert!(!value.is_resolved());
        assert!(value.to_json().is_none());
        assert!(Value::string_list(["a", "b"]).is_resolved());
    }

    #[test]
    fn json_conversion_keeps_nesting() {
        let value = Value::map([(
            "minecraftServer",
            Value::map([
                ("eula", Value::Bool(true)),
                ("serviceType", Value::string("LoadBalancer")),
            ]),
        )]);
        let json = value.to_json().unwrap();
        assert_eq!(json["minecraftServer"]["eula"], serde_json::json!(true));
        assert_eq!(Value::from_json(&json), Some(value));
    }

    #[test]
    fn json_floats_are_not_truncated() {
        let json = serde_json::json!({"memory": 1.5, "replicas": 2});
        let value = Value::from_json(&json).unwrap();
        assert_eq!(value.get("memory"), Some(&Value::string("1.5")));
        assert_eq!(value.get("replicas"), Some(&Value::Int(2)));
    }
}
