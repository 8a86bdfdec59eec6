//! Kubeconfig - Render the cluster access document
//!
//! The layout is fixed: tooling that consumes it compares it textually, so
//! field order and indentation must not change.

use crate::resource::Value;

/// Render the kubeconfig for a cluster.
///
/// `certificate_authority_data` is embedded verbatim (already base64 encoded
/// by EKS). Authentication goes through `aws-iam-authenticator token -i <name>`.
pub fn render(cluster_name: &str, endpoint: &str, certificate_authority_data: &str) -> String {
    format!(
        r#"apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: {certificate_authority_data}
    server: {endpoint}
  name: kubernetes
contexts:
- context:
    cluster: kubernetes
    user: aws
  name: aws
current-context: aws
kind: Config
users:
- name: aws
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1beta1
      command: aws-iam-authenticator
      args:
        - "token"
        - "-i"
        - "{cluster_name}"
"#
    )
}

/// Derive the kubeconfig from resolved cluster outputs
/// `[name, endpoint, certificate_authority]`, where `certificate_authority`
/// is a map carrying a `data` string.
pub fn from_cluster_outputs(inputs: &[Value]) -> Result<Value, String> {
    let [name, endpoint, certificate_authority] = inputs else {
        return Err(format!(
            "expected 3 inputs (name, endpoint, certificate_authority), got {}",
            inputs.len()
        ));
    };

    let name = name
        .as_str()
        .ok_or_else(|| format!("cluster name must be a string, got {:?}", name))?;
    let endpoint = endpoint
        .as_str()
        .ok_or_else(|| format!("cluster endpoint must be a string, got {:?}", endpoint))?;
    let data = certificate_authority
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            format!(
                "certificate_authority must be a map with a string 'data', got {:?}",
                certificate_authority
            )
        })?;

    Ok(Value::String(render(name, endpoint, data)))
}
