//! Client context: a kubeconfig document turned into a reachable API server

use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use log::{debug, info};

use craftstack_core::provider::{ProviderError, ProviderResult};
use craftstack_core::resource::{Resource, State, Value};

use crate::KubernetesProvider;

/// Parse a kubeconfig document
pub fn parse_kubeconfig(text: &str) -> Result<Kubeconfig, String> {
    Kubeconfig::from_yaml(text).map_err(|e| format!("Invalid kubeconfig: {}", e))
}

/// Server URL of the kubeconfig's current context
pub fn current_server(kubeconfig: &Kubeconfig) -> Option<String> {
    let context_name = kubeconfig.current_context.as_deref()?;
    let context = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context_name)?
        .context
        .as_ref()?;
    kubeconfig
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)?
        .cluster
        .as_ref()?
        .server
        .clone()
}

impl KubernetesProvider {
    /// Build a client from a kubeconfig document and ask the API server for its version
    async fn probe(&self, kubeconfig: Kubeconfig) -> Result<Info, String> {
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| format!("Failed to create Kubernetes config: {}", e))?;
        let client =
            Client::try_from(config).map_err(|e| format!("Failed to create client: {}", e))?;
        client
            .apiserver_version()
            .await
            .map_err(|e| format!("API server is not reachable: {}", e))
    }

    /// Read a client context. It exists once its kubeconfig is known and the
    /// API server answers.
    pub(crate) async fn read_client_context(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let Some(text) = resource.get_str("kubeconfig") else {
            return Ok(State::not_found(id));
        };
        let kubeconfig = parse_kubeconfig(text)
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        let server = current_server(&kubeconfig);

        match self.probe(kubeconfig).await {
            Ok(version) => Ok(client_state(resource, server, &version)),
            Err(e) => {
                debug!("{} is not usable yet: {}", id, e);
                Ok(State::not_found(id))
            }
        }
    }

    /// Establish a client context, failing if the API server cannot be reached
    pub(crate) async fn create_client_context(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let text = resource.get_str("kubeconfig").ok_or_else(|| {
            ProviderError::new("kubeconfig is required").for_resource(id.clone())
        })?;
        let kubeconfig = parse_kubeconfig(text)
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        let server = current_server(&kubeconfig);

        let version = self
            .probe(kubeconfig)
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        info!(
            "Connected to {} (Kubernetes {})",
            server.as_deref().unwrap_or("cluster"),
            version.git_version
        );

        Ok(client_state(resource, server, &version))
    }
}

fn client_state(resource: &Resource, server: Option<String>, version: &Info) -> State {
    let mut attributes: HashMap<String, Value> = resource
        .attributes
        .iter()
        .filter(|(_, v)| v.is_resolved())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    attributes.insert(
        "server_version".to_string(),
        Value::string(version.git_version.clone()),
    );

    let mut state = State::existing(resource.id.clone(), attributes);
    if let Some(server) = server {
        state
            .attributes
            .insert("server".to_string(), Value::string(server.clone()));
        state = state.with_identifier(server);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftstack_core::kubeconfig;

    #[test]
    fn test_rendered_kubeconfig_parses() {
        let text = kubeconfig::render(
            "my-mincraft-eks-cluster",
            "https://x.example",
            "ABC123",
        );
        let parsed = parse_kubeconfig(&text).unwrap();

        assert_eq!(parsed.current_context.as_deref(), Some("aws"));
        assert_eq!(current_server(&parsed).as_deref(), Some("https://x.example"));

        let user = parsed.auth_infos[0].auth_info.as_ref().unwrap();
        let exec = user.exec.as_ref().unwrap();
        assert_eq!(exec.command.as_deref(), Some("aws-iam-authenticator"));
        assert_eq!(
            exec.args,
            Some(vec![
                "token".to_string(),
                "-i".to_string(),
                "my-mincraft-eks-cluster".to_string()
            ])
        );
    }

    #[test]
    fn test_invalid_kubeconfig() {
        assert!(parse_kubeconfig("clusters: [").is_err());
    }

    #[test]
    fn test_current_server_without_context() {
        let parsed = parse_kubeconfig("apiVersion: v1\nkind: Config\n").unwrap();
        assert_eq!(current_server(&parsed), None);
    }

    #[tokio::test]
    async fn test_unknown_kubeconfig_reads_as_not_found() {
        let provider = KubernetesProvider::new();
        let resource = Resource::new("kubernetes.provider", "k8sprovider").with_attribute(
            "kubeconfig",
            Value::ResourceRef("kubeconfig".to_string(), "value".to_string()),
        );
        let state = provider.read_client_context(&resource).await.unwrap();
        assert!(!state.exists);
    }

    #[test]
    fn test_client_state() {
        let resource = Resource::new("kubernetes.provider", "k8sprovider")
            .with_attribute("kubeconfig", "apiVersion: v1\n");
        let version = Info {
            git_version: "v1.31.2-eks-1234".to_string(),
            ..Default::default()
        };
        let state = client_state(&resource, Some("https://x.example".to_string()), &version);

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("https://x.example"));
        assert_eq!(
            state.attributes.get("kubeconfig"),
            Some(&Value::string("apiVersion: v1\n"))
        );
        assert_eq!(
            state.attributes.get("server_version"),
            Some(&Value::string("v1.31.2-eks-1234"))
        );
    }
}
