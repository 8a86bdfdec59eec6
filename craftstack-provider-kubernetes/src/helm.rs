//! Helm releases, driven through the `helm` CLI
//!
//! Every call gets its own temporary kubeconfig file, so nothing is written
//! to the user's ~/.kube.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;

use craftstack_core::provider::{ProviderError, ProviderResult};
use craftstack_core::resource::{Resource, ResourceId, State, Value};

use crate::KubernetesProvider;

/// How long `helm --wait` may block on the release's resources
const WAIT_TIMEOUT: &str = "10m0s";

/// What `helm status` prints when the release itself is missing
const RELEASE_NOT_FOUND: &str = "release: not found";

/// Attributes that `helm status` cannot report; the declared value is kept
const UNOBSERVABLE: &[&str] = &["repository", "create_namespace", "kubeconfig"];

/// What a release declaration resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseSpec {
    pub name: String,
    pub chart: String,
    pub version: Option<String>,
    pub repository: Option<String>,
    pub namespace: String,
    pub create_namespace: bool,
    pub values: Option<serde_json::Value>,
}

impl ReleaseSpec {
    pub fn from_resource(resource: &Resource) -> Result<Self, String> {
        let required = |key: &str| {
            resource
                .get_str(key)
                .map(String::from)
                .ok_or_else(|| format!("{} is required", key))
        };

        let values = match resource.attributes.get("values") {
            Some(v) => Some(
                v.to_json()
                    .ok_or("values contain a reference that has not resolved")?,
            ),
            None => None,
        };

        Ok(Self {
            name: required("name")?,
            chart: required("chart")?,
            version: resource.get_str("version").map(String::from),
            repository: resource.get_str("repository").map(String::from),
            namespace: resource.get_str("namespace").unwrap_or("default").to_string(),
            create_namespace: resource
                .attributes
                .get("create_namespace")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            values,
        })
    }

    pub fn identifier(&self) -> String {
        release_identifier(&self.namespace, &self.name)
    }

    /// Arguments for `helm upgrade --install`
    pub fn upgrade_args(&self, kubeconfig: &Path, values_file: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.name.clone(),
            self.chart.clone(),
        ];
        if let Some(repository) = &self.repository {
            args.extend(["--repo".to_string(), repository.clone()]);
        }
        if let Some(version) = &self.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        args.extend(["--namespace".to_string(), self.namespace.clone()]);
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(values_file) = values_file {
            args.extend(["--values".to_string(), values_file.display().to_string()]);
        }
        args.extend(kubeconfig_args(kubeconfig));
        args.extend([
            "--wait".to_string(),
            "--timeout".to_string(),
            WAIT_TIMEOUT.to_string(),
        ]);
        args
    }
}

pub fn release_identifier(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn kubeconfig_args(kubeconfig: &Path) -> [String; 2] {
    ["--kubeconfig".to_string(), kubeconfig.display().to_string()]
}

/// Arguments for `helm status`
pub fn status_args(name: &str, namespace: &str, kubeconfig: &Path) -> Vec<String> {
    let mut args = vec![
        "status".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    args.extend(kubeconfig_args(kubeconfig));
    args
}

/// Arguments for `helm uninstall`
pub fn uninstall_args(name: &str, namespace: &str, kubeconfig: &Path) -> Vec<String> {
    let mut args = vec![
        "uninstall".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--wait".to_string(),
    ];
    args.extend(kubeconfig_args(kubeconfig));
    args
}

#[derive(Debug, Deserialize)]
struct ReleaseStatus {
    name: String,
    #[serde(default)]
    namespace: String,
    /// Revision number
    #[serde(default)]
    version: i64,
    info: ReleaseInfo,
    chart: Option<ChartStatus>,
    /// Only the user-supplied values
    config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ChartStatus {
    metadata: ChartMetadata,
}

#[derive(Debug, Deserialize)]
struct ChartMetadata {
    name: String,
    version: String,
}

/// Attributes of a release from `helm status --output json`
pub fn parse_status(json: &str) -> Result<HashMap<String, Value>, String> {
    let status: ReleaseStatus =
        serde_json::from_str(json).map_err(|e| format!("Invalid helm status output: {}", e))?;

    let mut attributes = HashMap::from([
        ("name".to_string(), Value::String(status.name)),
        ("namespace".to_string(), Value::String(status.namespace)),
        ("revision".to_string(), Value::Int(status.version)),
        ("status".to_string(), Value::String(status.info.status)),
    ]);

    if let Some(chart) = status.chart {
        attributes.insert("chart".to_string(), Value::String(chart.metadata.name));
        attributes.insert("version".to_string(), Value::String(chart.metadata.version));
    }

    let values = status
        .config
        .as_ref()
        .and_then(Value::from_json)
        .unwrap_or_else(|| Value::Map(HashMap::new()));
    attributes.insert("values".to_string(), values);

    Ok(attributes)
}

fn temp_file(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("craftstack-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

impl KubernetesProvider {
    async fn helm(&self, id: &ResourceId, args: &[String]) -> ProviderResult<std::process::Output> {
        debug!("{} {}", self.helm_binary, args.join(" "));
        Command::new(&self.helm_binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to run {}", self.helm_binary))
                    .for_resource(id.clone())
                    .with_cause(e)
            })
    }

    fn kubeconfig_file(&self, resource: &Resource) -> ProviderResult<NamedTempFile> {
        let text = resource.get_str("kubeconfig").ok_or_else(|| {
            ProviderError::new("kubeconfig is required").for_resource(resource.id.clone())
        })?;
        temp_file(text).map_err(|e| {
            ProviderError::new("Failed to write kubeconfig")
                .for_resource(resource.id.clone())
                .with_cause(e)
        })
    }

    /// Read a release with `helm status`
    pub(crate) async fn read_release(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        if resource.get_str("kubeconfig").is_none() {
            // No cluster to ask yet
            return Ok(State::not_found(id));
        }
        let spec = ReleaseSpec::from_resource(resource)
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        let kubeconfig = self.kubeconfig_file(resource)?;
        let output = self
            .helm(&id, &status_args(&spec.name, &spec.namespace, kubeconfig.path()))
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Anything else (unreachable cluster, missing exec plugin) is a failure
            if stderr.contains(RELEASE_NOT_FOUND) {
                return Ok(State::not_found(id));
            }
            return Err(
                ProviderError::new(format!("helm status failed: {}", stderr.trim()))
                    .for_resource(id),
            );
        }

        let mut attributes = parse_status(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        if let Some(status) = attributes.get("status").and_then(Value::as_str)
            && status != "deployed"
        {
            warn!("Release {} is {}", spec.identifier(), status);
        }
        for key in UNOBSERVABLE {
            if let Some(v) = resource.attributes.get(*key)
                && v.is_resolved()
            {
                attributes.insert(key.to_string(), v.clone());
            }
        }

        Ok(State::existing(id, attributes).with_identifier(spec.identifier()))
    }

    /// Install or upgrade a release with `helm upgrade --install`
    pub(crate) async fn install_release(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let spec = ReleaseSpec::from_resource(resource)
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        let kubeconfig = self.kubeconfig_file(resource)?;
        let values_file = match &spec.values {
            // JSON is valid YAML, so helm reads it as a values file
            Some(values) => Some(temp_file(&values.to_string()).map_err(|e| {
                ProviderError::new("Failed to write values file")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?),
            None => None,
        };

        info!(
            "Installing chart {} {} as {}",
            spec.chart,
            spec.version.as_deref().unwrap_or("(latest)"),
            spec.identifier()
        );
        let args = spec.upgrade_args(kubeconfig.path(), values_file.as_ref().map(|f| f.path()));
        let output = self.helm(&id, &args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                ProviderError::new(format!("helm upgrade failed: {}", stderr.trim()))
                    .for_resource(id),
            );
        }

        self.read_release(resource).await
    }

    /// Uninstall a release
    pub(crate) async fn uninstall_release(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> ProviderResult<()> {
        let id = resource.id.clone();
        let (namespace, name) = identifier.split_once('/').ok_or_else(|| {
            ProviderError::new(format!("Invalid release identifier: {}", identifier))
                .for_resource(id.clone())
        })?;

        let kubeconfig = self.kubeconfig_file(resource)?;
        let output = self
            .helm(&id, &uninstall_args(name, namespace, kubeconfig.path()))
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                ProviderError::new(format!("helm uninstall failed: {}", stderr.trim()))
                    .for_resource(id),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> Resource {
        Resource::new("kubernetes.helm_release", "minecraft")
            .with_attribute("name", "minecraft")
            .with_attribute("chart", "minecraft")
            .with_attribute("version", "4.4.0")
            .with_attribute("repository", "https://itzg.github.io/minecraft-server-charts")
            .with_attribute("namespace", "minecraft")
            .with_attribute("create_namespace", true)
            .with_attribute(
                "values",
                Value::map([(
                    "minecraftServer",
                    Value::map([
                        ("eula", Value::Bool(true)),
                        ("serviceType", Value::string("LoadBalancer")),
                    ]),
                )]),
            )
            .with_attribute("kubeconfig", "apiVersion: v1\nkind: Config\n")
    }

    const STATUS: &str = r#"{
        "name": "minecraft",
        "info": { "status": "deployed", "description": "Install complete" },
        "chart": { "metadata": { "name": "minecraft", "version": "4.4.0" } },
        "config": { "minecraftServer": { "eula": true, "serviceType": "LoadBalancer" } },
        "version": 1,
        "namespace": "minecraft"
    }"#;

    #[test]
    fn test_release_spec() {
        let spec = ReleaseSpec::from_resource(&release()).unwrap();
        assert_eq!(spec.identifier(), "minecraft/minecraft");
        assert!(spec.create_namespace);
        assert_eq!(
            spec.values,
            Some(serde_json::json!({
                "minecraftServer": { "eula": true, "serviceType": "LoadBalancer" }
            }))
        );
    }

    #[test]
    fn test_release_spec_requires_chart() {
        let resource = Resource::new("kubernetes.helm_release", "r").with_attribute("name", "r");
        assert_eq!(
            ReleaseSpec::from_resource(&resource).unwrap_err(),
            "chart is required"
        );
    }

    #[test]
    fn test_upgrade_args() {
        let spec = ReleaseSpec::from_resource(&release()).unwrap();
        let args = spec.upgrade_args(Path::new("/tmp/kc.yaml"), Some(Path::new("/tmp/v.yaml")));
        assert_eq!(
            args,
            vec![
                "upgrade",
                "--install",
                "minecraft",
                "minecraft",
                "--repo",
                "https://itzg.github.io/minecraft-server-charts",
                "--version",
                "4.4.0",
                "--namespace",
                "minecraft",
                "--create-namespace",
                "--values",
                "/tmp/v.yaml",
                "--kubeconfig",
                "/tmp/kc.yaml",
                "--wait",
                "--timeout",
                "10m0s",
            ]
        );
    }

    #[test]
    fn test_status_and_uninstall_args() {
        let kc = Path::new("/tmp/kc.yaml");
        assert_eq!(
            status_args("minecraft", "minecraft", kc),
            vec![
                "status",
                "minecraft",
                "--namespace",
                "minecraft",
                "--output",
                "json",
                "--kubeconfig",
                "/tmp/kc.yaml"
            ]
        );
        assert_eq!(uninstall_args("minecraft", "minecraft", kc)[0], "uninstall");
    }

    #[test]
    fn test_parse_status() {
        let attrs = parse_status(STATUS).unwrap();
        assert_eq!(attrs.get("chart"), Some(&Value::string("minecraft")));
        assert_eq!(attrs.get("version"), Some(&Value::string("4.4.0")));
        assert_eq!(attrs.get("revision"), Some(&Value::Int(1)));
        assert_eq!(attrs.get("status"), Some(&Value::string("deployed")));
        assert_eq!(
            attrs.get("values"),
            release().attributes.get("values")
        );
    }

    #[test]
    fn test_parse_status_without_values() {
        let attrs = parse_status(r#"{"name":"r","info":{"status":"failed"}}"#).unwrap();
        assert_eq!(attrs.get("values"), Some(&Value::Map(HashMap::new())));
        assert!(parse_status("not json").is_err());
    }

    #[cfg(unix)]
    fn fake_helm(dir: &Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("helm");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_release_with_fake_helm() {
        let dir = tempfile::tempdir().unwrap();
        let status_file = dir.path().join("status.json");
        std::fs::write(&status_file, STATUS).unwrap();
        let helm = fake_helm(dir.path(), &format!("cat {}", status_file.display()));

        let provider = KubernetesProvider::new().with_helm_binary(helm);
        let state = provider.read_release(&release()).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("minecraft/minecraft"));
        // Declared attributes all read back, so there is nothing to change
        for (key, value) in &release().attributes {
            assert_eq!(state.attributes.get(key), Some(value), "{}", key);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_release_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let helm = fake_helm(dir.path(), "echo 'Error: release: not found' >&2; exit 1");

        let provider = KubernetesProvider::new().with_helm_binary(helm);
        let state = provider.read_release(&release()).await.unwrap();
        assert!(!state.exists);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreachable_cluster_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let helm = fake_helm(
            dir.path(),
            "echo 'Error: Kubernetes cluster unreachable: exec: executable aws-iam-authenticator not found' >&2; exit 1",
        );

        let provider = KubernetesProvider::new().with_helm_binary(helm);
        let err = provider.read_release(&release()).await.unwrap_err();
        assert!(err.message.starts_with("helm status failed: Error: Kubernetes cluster unreachable"));
        assert_eq!(err.resource_id, Some(release().id));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_install_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let helm = fake_helm(dir.path(), "echo 'Error: chart not available' >&2; exit 1");

        let provider = KubernetesProvider::new().with_helm_binary(helm);
        let err = provider.install_release(&release()).await.unwrap_err();
        assert_eq!(err.message, "helm upgrade failed: Error: chart not available");
        assert_eq!(err.resource_id, Some(release().id));
    }
}
