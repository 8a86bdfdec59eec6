//! craftstack AWS Provider
//!
//! AWS Provider implementation: default VPC and subnet lookups, IAM roles and
//! policy attachments, security groups, EKS clusters and node groups.
//!
//! There is no state file. Managed resources are found again by their physical
//! names (role name, group name, cluster name), so `read` works from the
//! declared attributes alone.

mod ec2;
mod eks;
mod iam;
pub mod schemas;

pub use eks::WaitConfig;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_eks::Client as EksClient;
use aws_sdk_iam::Client as IamClient;
use craftstack_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceType,
};
use craftstack_core::resource::{Resource, ResourceId, State};
use craftstack_core::schema::ResourceSchema;

pub const VPC: &str = "aws.ec2.vpc";
pub const SUBNETS: &str = "aws.ec2.subnets";
pub const SECURITY_GROUP: &str = "aws.ec2.security_group";
pub const ROLE: &str = "aws.iam.role";
pub const ROLE_POLICY_ATTACHMENT: &str = "aws.iam.role_policy_attachment";
pub const CLUSTER: &str = "aws.eks.cluster";
pub const NODE_GROUP: &str = "aws.eks.node_group";

/// Default VPC lookup (data source)
pub struct VpcType;

impl ResourceType for VpcType {
    fn name(&self) -> &'static str {
        VPC
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ec2::vpc_schema()
    }
}

/// Subnets of a VPC (data source)
pub struct SubnetsType;

impl ResourceType for SubnetsType {
    fn name(&self) -> &'static str {
        SUBNETS
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ec2::subnets_schema()
    }
}

/// Security Group resource type
pub struct SecurityGroupType;

impl ResourceType for SecurityGroupType {
    fn name(&self) -> &'static str {
        SECURITY_GROUP
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ec2::security_group_schema()
    }
}

/// IAM Role resource type
pub struct RoleType;

impl ResourceType for RoleType {
    fn name(&self) -> &'static str {
        ROLE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::iam::role_schema()
    }
}

/// IAM Role Policy Attachment resource type
pub struct RolePolicyAttachmentType;

impl ResourceType for RolePolicyAttachmentType {
    fn name(&self) -> &'static str {
        ROLE_POLICY_ATTACHMENT
    }

    fn schema(&self) -> ResourceSchema {
        schemas::iam::role_policy_attachment_schema()
    }
}

/// EKS Cluster resource type
pub struct ClusterType;

impl ResourceType for ClusterType {
    fn name(&self) -> &'static str {
        CLUSTER
    }

    fn schema(&self) -> ResourceSchema {
        schemas::eks::cluster_schema()
    }
}

/// EKS Node Group resource type
pub struct NodeGroupType;

impl ResourceType for NodeGroupType {
    fn name(&self) -> &'static str {
        NODE_GROUP
    }

    fn schema(&self) -> ResourceSchema {
        schemas::eks::node_group_schema()
    }
}

/// AWS Provider
pub struct AwsProvider {
    ec2_client: Ec2Client,
    iam_client: IamClient,
    eks_client: EksClient,
    region: Option<String>,
    wait: WaitConfig,
}

impl AwsProvider {
    /// Create a new AWS Provider.
    /// Without an explicit region the SDK's default provider chain decides.
    pub async fn new(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Self {
            ec2_client: Ec2Client::new(&config),
            iam_client: IamClient::new(&config),
            eks_client: EksClient::new(&config),
            region: config.region().map(|r| r.to_string()),
            wait: WaitConfig::default(),
        }
    }

    /// Create with specific clients (for testing)
    pub fn with_clients(
        ec2_client: Ec2Client,
        iam_client: IamClient,
        eks_client: EksClient,
        region: Option<String>,
    ) -> Self {
        Self {
            ec2_client,
            iam_client,
            eks_client,
            region,
            wait: WaitConfig::default(),
        }
    }

    /// Override the polling budget used while EKS resources settle
    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Region the clients talk to, if one could be determined
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// String attribute that must be present (and resolved) before calling AWS
pub(crate) fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| {
        ProviderError::new(format!("{} is required", key)).for_resource(resource.id.clone())
    })
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

fn data_source_only(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("{} is a data source and cannot be managed", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![
            Box::new(VpcType),
            Box::new(SubnetsType),
            Box::new(SecurityGroupType),
            Box::new(RoleType),
            Box::new(RolePolicyAttachmentType),
            Box::new(ClusterType),
            Box::new(NodeGroupType),
        ]
    }

    fn read(
        &self,
        resource: &Resource,
        _identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                VPC => self.read_default_vpc(&resource).await,
                SUBNETS => self.read_subnets(&resource).await,
                SECURITY_GROUP => self.read_security_group(&resource).await,
                ROLE => self.read_role(&resource).await,
                ROLE_POLICY_ATTACHMENT => self.read_role_policy_attachment(&resource).await,
                CLUSTER => self.read_cluster(&resource).await,
                NODE_GROUP => self.read_node_group(&resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                VPC | SUBNETS => Err(data_source_only(&resource.id)),
                SECURITY_GROUP => self.create_security_group(&resource).await,
                ROLE => self.create_role(&resource).await,
                ROLE_POLICY_ATTACHMENT => self.create_role_policy_attachment(&resource).await,
                CLUSTER => self.create_cluster(&resource).await,
                NODE_GROUP => self.create_node_group(&resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                VPC | SUBNETS => Err(data_source_only(&id)),
                SECURITY_GROUP => {
                    self.update_security_group(&id, &identifier, &from, &to)
                        .await
                }
                ROLE => self.update_role(&id, &identifier, &from, &to).await,
                ROLE_POLICY_ATTACHMENT => Err(ProviderError::new(
                    "Role policy attachments cannot be updated; delete and recreate them",
                )
                .for_resource(id.clone())),
                CLUSTER => self.update_cluster(&id, &from, &to).await,
                NODE_GROUP => self.update_node_group(&id, &identifier, &from, &to).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = resource.id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                VPC | SUBNETS => Err(data_source_only(&id)),
                SECURITY_GROUP => self.delete_security_group(&id, &identifier).await,
                ROLE => self.delete_role(&id, &identifier).await,
                ROLE_POLICY_ATTACHMENT => {
                    self.delete_role_policy_attachment(&id, &identifier).await
                }
                CLUSTER => self.delete_cluster(&id, &identifier).await,
                NODE_GROUP => self.delete_node_group(&id, &identifier).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }
}
