//! EKS operations: clusters and managed node groups
//!
//! Creates and deletes are long-running, so each waits for the cluster or
//! node group to settle by polling Describe* with a fixed number of attempts.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_eks::types::{
    ClusterStatus, NodegroupScalingConfig, NodegroupStatus, VpcConfigRequest,
};
use craftstack_core::provider::{ProviderError, ProviderResult};
use craftstack_core::resource::{Resource, ResourceId, State, Value};
use log::{debug, info};

use crate::{AwsProvider, required_str};

/// Separator between cluster name and node group name in a node group identifier
const NODE_GROUP_SEPARATOR: char = ':';

/// Polling budget for cluster and node group waiters
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        // EKS control planes typically take 10-15 minutes
        Self {
            max_attempts: 120,
            delay: Duration::from_secs(15),
        }
    }
}

/// What a waiter is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Active,
    Gone,
}

impl AwsProvider {
    // ========== Cluster ==========

    /// Read an EKS cluster by name
    pub(crate) async fn read_cluster(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required_str(resource, "name")?;

        let result = match self.eks_client.describe_cluster().name(name).send().await {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                return Ok(State::not_found(id));
            }
            Err(e) => {
                return Err(ProviderError::new(format!("Failed to describe cluster: {:?}", e))
                    .for_resource(id));
            }
        };

        let Some(cluster) = result.cluster() else {
            return Ok(State::not_found(id));
        };

        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::string(name));
        if let Some(arn) = cluster.arn() {
            attributes.insert("arn".to_string(), Value::string(arn));
        }
        if let Some(role_arn) = cluster.role_arn() {
            attributes.insert("role_arn".to_string(), Value::string(role_arn));
        }
        if let Some(endpoint) = cluster.endpoint() {
            attributes.insert("endpoint".to_string(), Value::string(endpoint));
        }
        if let Some(data) = cluster.certificate_authority().and_then(|ca| ca.data()) {
            attributes.insert(
                "certificate_authority".to_string(),
                Value::map([("data", Value::string(data))]),
            );
        }
        if let Some(status) = cluster.status() {
            attributes.insert("status".to_string(), Value::string(status.as_str()));
        }
        if let Some(version) = cluster.version() {
            attributes.insert("version".to_string(), Value::string(version));
        }

        if let Some(vpc) = cluster.resources_vpc_config() {
            let desired = resource.attributes.get("vpc_config");
            let field = |key: &str| desired.and_then(|d| d.get(key));
            attributes.insert(
                "vpc_config".to_string(),
                Value::map([
                    (
                        "subnet_ids",
                        Value::string_list(align_order(vpc.subnet_ids(), field("subnet_ids"))),
                    ),
                    (
                        "security_group_ids",
                        Value::string_list(align_order(
                            vpc.security_group_ids(),
                            field("security_group_ids"),
                        )),
                    ),
                    (
                        "public_access_cidrs",
                        Value::string_list(align_order(
                            vpc.public_access_cidrs(),
                            field("public_access_cidrs"),
                        )),
                    ),
                ]),
            );
            if let Some(sg) = vpc.cluster_security_group_id() {
                attributes.insert("cluster_security_group_id".to_string(), Value::string(sg));
            }
        }

        if let Some(tags) = cluster.tags() {
            attributes.insert(
                "tags".to_string(),
                declared_tags(tags, resource.attributes.get("tags")),
            );
        }

        Ok(State::existing(id, attributes).with_identifier(name))
    }

    /// Create an EKS cluster and wait for it to become ACTIVE
    pub(crate) async fn create_cluster(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required_str(resource, "name")?;
        let role_arn = required_str(resource, "role_arn")?;

        let vpc_config = resource.attributes.get("vpc_config").ok_or_else(|| {
            ProviderError::new("vpc_config is required").for_resource(id.clone())
        })?;
        let strings = |key: &str| vpc_config.get(key).map(Value::strings);

        let request = VpcConfigRequest::builder()
            .set_subnet_ids(strings("subnet_ids"))
            .set_security_group_ids(strings("security_group_ids"))
            .set_public_access_cidrs(strings("public_access_cidrs"))
            .endpoint_public_access(true)
            .build();

        self.eks_client
            .create_cluster()
            .name(name)
            .role_arn(role_arn)
            .resources_vpc_config(request)
            .set_tags(string_map(resource.attributes.get("tags")))
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create cluster: {:?}", e))
                    .for_resource(id.clone())
            })?;

        info!("Waiting for cluster {} to become ACTIVE", name);
        self.wait_for_cluster(&id, name, Settled::Active).await?;

        self.read_cluster(resource).await
    }

    /// Update cluster tags and public access CIDRs in place
    pub(crate) async fn update_cluster(
        &self,
        id: &ResourceId,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        for immutable in ["name", "role_arn"] {
            if from.attributes.get(immutable) != to.attributes.get(immutable) {
                return Err(ProviderError::new(format!(
                    "Changing {} requires replacing the cluster; delete and recreate it",
                    immutable
                ))
                .for_resource(id.clone()));
            }
        }

        let field = |attrs: Option<&Value>, key: &str| attrs.and_then(|v| v.get(key)).cloned();
        let from_vpc = from.attributes.get("vpc_config");
        let to_vpc = to.attributes.get("vpc_config");
        for immutable in ["subnet_ids", "security_group_ids"] {
            if field(from_vpc, immutable) != field(to_vpc, immutable) {
                return Err(ProviderError::new(format!(
                    "Changing vpc_config.{} requires replacing the cluster; delete and recreate it",
                    immutable
                ))
                .for_resource(id.clone()));
            }
        }

        let name = required_str(to, "name")?;

        if let Some(arn) = from.attributes.get("arn").and_then(Value::as_str)
            && from.attributes.get("tags") != to.attributes.get("tags")
            && let Some(tags) = string_map(to.attributes.get("tags"))
        {
            self.eks_client
                .tag_resource()
                .resource_arn(arn)
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to tag cluster: {:?}", e))
                        .for_resource(id.clone())
                })?;
        }

        let cidrs = field(to_vpc, "public_access_cidrs");
        if field(from_vpc, "public_access_cidrs") != cidrs {
            let request = VpcConfigRequest::builder()
                .set_public_access_cidrs(cidrs.as_ref().map(Value::strings))
                .build();
            self.eks_client
                .update_cluster_config()
                .name(name)
                .resources_vpc_config(request)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to update cluster config: {:?}", e))
                        .for_resource(id.clone())
                })?;
            self.wait_for_cluster(id, name, Settled::Active).await?;
        }

        self.read_cluster(to).await
    }

    /// Delete an EKS cluster and wait until it is gone
    pub(crate) async fn delete_cluster(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        self.eks_client
            .delete_cluster()
            .name(identifier)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete cluster: {:?}", e))
                    .for_resource(id.clone())
            })?;

        info!("Waiting for cluster {} to be deleted", identifier);
        self.wait_for_cluster(id, identifier, Settled::Gone).await
    }

    async fn wait_for_cluster(
        &self,
        id: &ResourceId,
        name: &str,
        until: Settled,
    ) -> ProviderResult<()> {
        for attempt in 0..self.wait.max_attempts {
            let status = match self.eks_client.describe_cluster().name(name).send().await {
                Ok(result) => result.cluster().and_then(|c| c.status()).cloned(),
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception()) =>
                {
                    None
                }
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "Failed to describe cluster: {:?}",
                        e
                    ))
                    .for_resource(id.clone()));
                }
            };

            match (until, status) {
                (Settled::Gone, None) => return Ok(()),
                (Settled::Active, Some(ClusterStatus::Active)) => return Ok(()),
                (Settled::Active, Some(ClusterStatus::Failed)) => {
                    return Err(
                        ProviderError::new(format!("Cluster {} failed to create", name))
                            .for_resource(id.clone()),
                    );
                }
                (_, status) => {
                    debug!(
                        "Cluster {} is {:?} (attempt {})",
                        name,
                        status.as_ref().map(ClusterStatus::as_str),
                        attempt + 1
                    );
                    tokio::time::sleep(self.wait.delay).await;
                }
            }
        }

        Err(ProviderError::new(format!("Timed out waiting for cluster {}", name))
            .for_resource(id.clone()))
    }

    // ========== Node Group ==========

    /// Read a managed node group by cluster and node group name
    pub(crate) async fn read_node_group(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let (Some(cluster_name), Some(node_group_name)) = (
            resource.get_str("cluster_name"),
            resource.get_str("node_group_name"),
        ) else {
            return Ok(State::not_found(id));
        };

        let result = match self
            .eks_client
            .describe_nodegroup()
            .cluster_name(cluster_name)
            .nodegroup_name(node_group_name)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                return Ok(State::not_found(id));
            }
            Err(e) => {
                return Err(
                    ProviderError::new(format!("Failed to describe node group: {:?}", e))
                        .for_resource(id),
                );
            }
        };

        let Some(node_group) = result.nodegroup() else {
            return Ok(State::not_found(id));
        };

        let mut attributes = HashMap::new();
        attributes.insert("cluster_name".to_string(), Value::string(cluster_name));
        attributes.insert("node_group_name".to_string(), Value::string(node_group_name));
        if let Some(arn) = node_group.nodegroup_arn() {
            attributes.insert("arn".to_string(), Value::string(arn));
        }
        if let Some(role) = node_group.node_role() {
            attributes.insert("node_role_arn".to_string(), Value::string(role));
        }
        if let Some(status) = node_group.status() {
            attributes.insert("status".to_string(), Value::string(status.as_str()));
        }
        attributes.insert(
            "subnet_ids".to_string(),
            Value::string_list(align_order(
                node_group.subnets(),
                resource.attributes.get("subnet_ids"),
            )),
        );
        if let Some(scaling) = node_group.scaling_config() {
            let size = |n: Option<i32>| Value::Int(i64::from(n.unwrap_or(0)));
            attributes.insert(
                "scaling_config".to_string(),
                Value::map([
                    ("desired_size", size(scaling.desired_size())),
                    ("min_size", size(scaling.min_size())),
                    ("max_size", size(scaling.max_size())),
                ]),
            );
        }

        Ok(State::existing(id, attributes)
            .with_identifier(node_group_identifier(cluster_name, node_group_name)))
    }

    /// Create a managed node group and wait for it to become ACTIVE
    pub(crate) async fn create_node_group(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let cluster_name = required_str(resource, "cluster_name")?;
        let node_group_name = required_str(resource, "node_group_name")?;
        let node_role = required_str(resource, "node_role_arn")?;
        let subnets = resource
            .attributes
            .get("subnet_ids")
            .map(Value::strings)
            .unwrap_or_default();
        let scaling = scaling_config(resource)?;

        self.eks_client
            .create_nodegroup()
            .cluster_name(cluster_name)
            .nodegroup_name(node_group_name)
            .node_role(node_role)
            .set_subnets(Some(subnets))
            .scaling_config(scaling)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create node group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        info!("Waiting for node group {} to become ACTIVE", node_group_name);
        self.wait_for_node_group(&id, cluster_name, node_group_name, Settled::Active)
            .await?;

        self.read_node_group(resource).await
    }

    /// Update node group scaling in place
    pub(crate) async fn update_node_group(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        for immutable in ["cluster_name", "node_group_name", "node_role_arn", "subnet_ids"] {
            if from.attributes.get(immutable) != to.attributes.get(immutable) {
                return Err(ProviderError::new(format!(
                    "Changing {} requires replacing the node group; delete and recreate it",
                    immutable
                ))
                .for_resource(id.clone()));
            }
        }

        let (cluster_name, node_group_name) =
            parse_node_group_identifier(identifier).ok_or_else(|| {
                ProviderError::new(format!("Invalid node group identifier: {}", identifier))
                    .for_resource(id.clone())
            })?;

        self.eks_client
            .update_nodegroup_config()
            .cluster_name(cluster_name)
            .nodegroup_name(node_group_name)
            .scaling_config(scaling_config(to)?)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to update node group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        self.wait_for_node_group(id, cluster_name, node_group_name, Settled::Active)
            .await?;

        self.read_node_group(to).await
    }

    /// Delete a managed node group and wait until it is gone
    pub(crate) async fn delete_node_group(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let (cluster_name, node_group_name) =
            parse_node_group_identifier(identifier).ok_or_else(|| {
                ProviderError::new(format!("Invalid node group identifier: {}", identifier))
                    .for_resource(id.clone())
            })?;

        self.eks_client
            .delete_nodegroup()
            .cluster_name(cluster_name)
            .nodegroup_name(node_group_name)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete node group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        info!("Waiting for node group {} to be deleted", node_group_name);
        self.wait_for_node_group(id, cluster_name, node_group_name, Settled::Gone)
            .await
    }

    async fn wait_for_node_group(
        &self,
        id: &ResourceId,
        cluster_name: &str,
        node_group_name: &str,
        until: Settled,
    ) -> ProviderResult<()> {
        for attempt in 0..self.wait.max_attempts {
            let status = match self
                .eks_client
                .describe_nodegroup()
                .cluster_name(cluster_name)
                .nodegroup_name(node_group_name)
                .send()
                .await
            {
                Ok(result) => result.nodegroup().and_then(|n| n.status()).cloned(),
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception()) =>
                {
                    None
                }
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "Failed to describe node group: {:?}",
                        e
                    ))
                    .for_resource(id.clone()));
                }
            };

            match (until, status) {
                (Settled::Gone, None) => return Ok(()),
                (Settled::Active, Some(NodegroupStatus::Active)) => return Ok(()),
                (
                    Settled::Active,
                    Some(NodegroupStatus::CreateFailed | NodegroupStatus::Degraded),
                ) => {
                    return Err(ProviderError::new(format!(
                        "Node group {} failed to become ACTIVE",
                        node_group_name
                    ))
                    .for_resource(id.clone()));
                }
                (Settled::Gone, Some(NodegroupStatus::DeleteFailed)) => {
                    return Err(ProviderError::new(format!(
                        "Node group {} failed to delete",
                        node_group_name
                    ))
                    .for_resource(id.clone()));
                }
                (_, status) => {
                    debug!(
                        "Node group {} is {:?} (attempt {})",
                        node_group_name,
                        status.as_ref().map(NodegroupStatus::as_str),
                        attempt + 1
                    );
                    tokio::time::sleep(self.wait.delay).await;
                }
            }
        }

        Err(
            ProviderError::new(format!("Timed out waiting for node group {}", node_group_name))
                .for_resource(id.clone()),
        )
    }
}

fn scaling_config(resource: &Resource) -> ProviderResult<NodegroupScalingConfig> {
    let scaling = resource.attributes.get("scaling_config");
    let size = |key: &str| -> ProviderResult<i32> {
        let n = scaling.and_then(|s| s.get(key)).and_then(Value::as_int).ok_or_else(|| {
            ProviderError::new(format!("scaling_config.{} is required", key))
                .for_resource(resource.id.clone())
        })?;
        i32::try_from(n).map_err(|_| {
            ProviderError::new(format!("scaling_config.{} {} is out of range", key, n))
                .for_resource(resource.id.clone())
        })
    };

    Ok(NodegroupScalingConfig::builder()
        .desired_size(size("desired_size")?)
        .min_size(size("min_size")?)
        .max_size(size("max_size")?)
        .build())
}

/// Report `actual` in the declared order when both hold the same items,
/// so a reordering by the API does not show up as drift.
pub fn align_order(actual: &[String], desired: Option<&Value>) -> Vec<String> {
    let declared = desired.map(Value::strings).unwrap_or_default();
    let mut a: Vec<&String> = actual.iter().collect();
    let mut d: Vec<&String> = declared.iter().collect();
    a.sort();
    d.sort();
    if a == d {
        declared
    } else {
        actual.to_vec()
    }
}

/// Tags limited to the declared keys; tags added outside the stack are not drift
fn declared_tags(actual: &HashMap<String, String>, desired: Option<&Value>) -> Value {
    let keep = |key: &String| desired.is_none_or(|d| d.get(key).is_some());
    Value::Map(
        actual
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(k, v)| (k.clone(), Value::string(v)))
            .collect(),
    )
}

fn string_map(value: Option<&Value>) -> Option<HashMap<String, String>> {
    value.and_then(Value::as_map).map(|map| {
        map.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    })
}

pub fn node_group_identifier(cluster_name: &str, node_group_name: &str) -> String {
    format!("{}{}{}", cluster_name, NODE_GROUP_SEPARATOR, node_group_name)
}

pub fn parse_node_group_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier
        .split_once(NODE_GROUP_SEPARATOR)
        .filter(|(cluster, group)| !cluster.is_empty() && !group.is_empty())
}
