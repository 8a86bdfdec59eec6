//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific infrastructure (AWS,
//! Kubernetes, ...). It is responsible for converting Effects into actual
//! API calls.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "aws.iam.role")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider; also the resource-type prefix it serves (e.g., "aws")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// If identifier is provided, use it to read the resource directly.
    /// Otherwise, look the resource up from its (resolved) attributes: data
    /// sources by their filters, managed resources by their physical name.
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(
        &self,
        resource: &Resource,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the provider-side ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        resource: &Resource,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(resource, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(resource, identifier)
    }
}

/// Several providers behind one, dispatching on the resource-type prefix
#[derive(Default)]
pub struct ProviderSet {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    fn route(&self, id: &ResourceId) -> ProviderResult<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.name() == id.provider())
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "No provider registered for resource type '{}'",
                    id.resource_type
                ))
                .for_resource(id.clone())
            })
    }

    /// Schemas of every resource type served by the registered providers
    pub fn schemas(&self) -> Vec<ResourceSchema> {
        self.resource_types().iter().map(|t| t.schema()).collect()
    }
}

impl Provider for ProviderSet {
    fn name(&self) -> &'static str {
        "set"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        self.providers
            .iter()
            .flat_map(|p| p.resource_types())
            .collect()
    }

    fn read(
        &self,
        resource: &Resource,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        match self.route(&resource.id) {
            Ok(provider) => provider.read(resource, identifier),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        match self.route(&resource.id) {
            Ok(provider) => provider.create(resource),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        match self.route(id) {
            Ok(provider) => provider.update(id, identifier, from, to),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        match self.route(&resource.id) {
            Ok(provider) => provider.delete(resource, identifier),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock Provider for testing
    struct MockProvider(&'static str);

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            self.0
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            resource: &Resource,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            let identifier = format!("{}-id-123", self.0);
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier(identifier)) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete(
            &self,
            _resource: &Resource,
            _identifier: &str,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider("mock");
        let resource = Resource::new("mock.thing", "example");
        let state = provider.read(&resource, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn provider_set_routes_by_prefix() {
        let set = ProviderSet::new()
            .with(MockProvider("aws"))
            .with(MockProvider("kubernetes"));

        let state = set
            .create(&Resource::new("kubernetes.helm_release", "minecraft"))
            .await
            .unwrap();
        assert_eq!(state.identifier.as_deref(), Some("kubernetes-id-123"));

        let state = set
            .create(&Resource::new("aws.iam.role", "node-iam-role"))
            .await
            .unwrap();
        assert_eq!(state.identifier.as_deref(), Some("aws-id-123"));
    }

    #[tokio::test]
    async fn provider_set_rejects_unknown_prefix() {
        let set = ProviderSet::new().with(MockProvider("aws"));
        let err = set
            .create(&Resource::new("gcp.compute.instance", "vm"))
            .await
            .unwrap_err();
        assert!(err.message.contains("gcp.compute.instance"));
        assert_eq!(
            err.resource_id,
            Some(ResourceId::new("gcp.compute.instance", "vm"))
        );
    }
}
