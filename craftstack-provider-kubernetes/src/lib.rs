//! craftstack Kubernetes Provider
//!
//! Two resource types:
//! - `kubernetes.provider`: a client context built from a kubeconfig document,
//!   usable once the API server answers a version probe
//! - `kubernetes.helm_release`: a chart release installed through the `helm` CLI

mod client;
mod helm;
pub mod schemas;

pub use client::{current_server, parse_kubeconfig};
pub use helm::{ReleaseSpec, parse_status};

use craftstack_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceType,
};
use craftstack_core::resource::{Resource, ResourceId, State};
use craftstack_core::schema::ResourceSchema;

pub const CLIENT_CONTEXT: &str = "kubernetes.provider";
pub const HELM_RELEASE: &str = "kubernetes.helm_release";

/// Client context resource type
pub struct ClientContextType;

impl ResourceType for ClientContextType {
    fn name(&self) -> &'static str {
        CLIENT_CONTEXT
    }

    fn schema(&self) -> ResourceSchema {
        schemas::client_context_schema()
    }
}

/// Helm release resource type
pub struct HelmReleaseType;

impl ResourceType for HelmReleaseType {
    fn name(&self) -> &'static str {
        HELM_RELEASE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::helm_release_schema()
    }
}

/// Kubernetes Provider
pub struct KubernetesProvider {
    helm_binary: String,
}

impl Default for KubernetesProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KubernetesProvider {
    pub fn new() -> Self {
        Self {
            helm_binary: "helm".to_string(),
        }
    }

    /// Use a specific helm executable instead of the one on PATH
    pub fn with_helm_binary(mut self, path: impl Into<String>) -> Self {
        self.helm_binary = path.into();
        self
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for KubernetesProvider {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![Box::new(ClientContextType), Box::new(HelmReleaseType)]
    }

    fn read(
        &self,
        resource: &Resource,
        _identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                CLIENT_CONTEXT => self.read_client_context(&resource).await,
                HELM_RELEASE => self.read_release(&resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                CLIENT_CONTEXT => self.create_client_context(&resource).await,
                HELM_RELEASE => self.install_release(&resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                // A new kubeconfig only needs a new probe
                CLIENT_CONTEXT => self.create_client_context(&to).await,
                HELM_RELEASE => {
                    let spec = ReleaseSpec::from_resource(&to)
                        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
                    if spec.identifier() != identifier {
                        return Err(ProviderError::new(format!(
                            "Release {} cannot move to {}; delete and recreate it",
                            identifier,
                            spec.identifier()
                        ))
                        .for_resource(id.clone()));
                    }
                    // upgrade --install is already an in-place upgrade
                    self.install_release(&to).await
                }
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                // Nothing exists outside this process
                CLIENT_CONTEXT => Ok(()),
                HELM_RELEASE => self.uninstall_release(&resource, &identifier).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deleting_client_context_is_a_no_op() {
        let provider = KubernetesProvider::new().with_helm_binary("/nonexistent/helm");
        let resource = Resource::new(CLIENT_CONTEXT, "k8sprovider");
        assert!(provider.delete(&resource, "https://x.example").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let provider = KubernetesProvider::new();
        let resource = Resource::new("kubernetes.deployment", "web");
        let err = provider.read(&resource, None).await.unwrap_err();
        assert_eq!(err.message, "Unknown resource type: kubernetes.deployment");
    }

    #[tokio::test]
    async fn test_release_without_kubeconfig_reads_as_not_found() {
        let provider = KubernetesProvider::new().with_helm_binary("/nonexistent/helm");
        let resource = Resource::new(HELM_RELEASE, "minecraft")
            .with_attribute("name", "minecraft")
            .with_attribute("chart", "minecraft");
        let state = provider.read(&resource, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn test_missing_helm_binary_is_a_provider_error() {
        let provider = KubernetesProvider::new().with_helm_binary("/nonexistent/helm");
        let resource = Resource::new(HELM_RELEASE, "minecraft")
            .with_attribute("name", "minecraft")
            .with_attribute("chart", "minecraft")
            .with_attribute("kubeconfig", "apiVersion: v1\n");
        let err = provider.create(&resource).await.unwrap_err();
        assert_eq!(err.message, "Failed to run /nonexistent/helm");
        assert!(err.cause.is_some());
    }
}
