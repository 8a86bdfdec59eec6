//! The Minecraft-on-EKS stack

use craftstack_core::error::ApplyError;
use craftstack_core::kubeconfig;
use craftstack_core::resource::{Resource, Value};
use craftstack_core::stack::Stack;

pub const WORKER_NODE_POLICY: &str = "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy";
pub const CNI_POLICY: &str = "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy";
pub const REGISTRY_READ_ONLY_POLICY: &str =
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly";

/// Trust policy letting `service` assume a role
pub fn trust_policy(service: &str) -> String {
    format!(
        r#"{{
    "Version": "2012-10-17",
    "Statement": [
        {{
            "Effect": "Allow",
            "Principal": {{
                "Service": "{}"
            }},
            "Action": "sts:AssumeRole"
        }}
    ]
}}"#,
        service
    )
}

/// Chart release settings
#[derive(Debug, Clone)]
pub struct ChartConfig {
    pub release_name: String,
    pub chart: String,
    pub version: String,
    pub repository: String,
    pub namespace: String,
    pub motd: String,
    pub service_type: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            release_name: "minecraft".to_string(),
            chart: "minecraft".to_string(),
            version: "4.4.0".to_string(),
            repository: "https://itzg.github.io/minecraft-server-charts".to_string(),
            namespace: "minecraft".to_string(),
            motd: "Cloud Native Türkiye - Minecraft Server".to_string(),
            service_type: "LoadBalancer".to_string(),
        }
    }
}

/// Names and sizes that feed the declaration
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub cluster_role_name: String,
    pub node_role_name: String,
    pub security_group_name: String,
    pub cluster_name: String,
    /// Value of the cluster's `Name` tag
    pub cluster_tag_name: String,
    pub node_group_name: String,
    pub minecraft_port: i64,
    pub desired_size: i64,
    pub min_size: i64,
    pub max_size: i64,
    pub chart: ChartConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            cluster_role_name: "eks-iam-role".to_string(),
            node_role_name: "node-iam-role".to_string(),
            security_group_name: "eks-sg".to_string(),
            cluster_name: "eks-cluster".to_string(),
            cluster_tag_name: "my-mincraft-eks-cluster".to_string(),
            node_group_name: "eks-node-group".to_string(),
            minecraft_port: 25565,
            desired_size: 2,
            min_size: 1,
            max_size: 2,
            chart: ChartConfig::default(),
        }
    }
}

fn rule(protocol: &str, port: i64, description: &str) -> Value {
    Value::map([
        ("protocol", Value::string(protocol)),
        ("from_port", Value::Int(port)),
        ("to_port", Value::Int(port)),
        ("cidr_blocks", Value::string_list(["0.0.0.0/0"])),
        ("description", Value::string(description)),
    ])
}

/// Declare the whole stack. Nothing is contacted here.
pub fn minecraft_stack(config: &StackConfig) -> Stack {
    let mut stack = Stack::new("minecraft");

    // Network
    let vpc = stack.data(Resource::new("aws.ec2.vpc", "vpc").with_attribute("default", true));
    let subnets = stack.data(
        Resource::new("aws.ec2.subnets", "subnets").with_attribute("vpc_id", vpc.output("id")),
    );

    // Roles
    let cluster_role = stack.resource(
        Resource::new("aws.iam.role", "eks-iam-role")
            .with_attribute("name", config.cluster_role_name.as_str())
            .with_attribute("assume_role_policy", trust_policy("eks.amazonaws.com")),
    );
    let node_role = stack.resource(
        Resource::new("aws.iam.role", "node-iam-role")
            .with_attribute("name", config.node_role_name.as_str())
            .with_attribute("assume_role_policy", trust_policy("ec2.amazonaws.com")),
    );
    for (i, policy_arn) in [WORKER_NODE_POLICY, CNI_POLICY, REGISTRY_READ_ONLY_POLICY]
        .into_iter()
        .enumerate()
    {
        stack.resource(
            Resource::new(
                "aws.iam.role_policy_attachment",
                format!("node-iam-role-attachment{}", i + 1),
            )
            .with_attribute("role", node_role.output("name"))
            .with_attribute("policy_arn", policy_arn),
        );
    }

    let security_group = stack.resource(
        Resource::new("aws.ec2.security_group", "eks-sg")
            .with_attribute("name", config.security_group_name.as_str())
            .with_attribute("description", "EKS Security Group")
            .with_attribute("vpc_id", vpc.output("id"))
            .with_attribute(
                "ingress",
                Value::List(vec![rule("tcp", config.minecraft_port, "Allow Minecraft from VPC")]),
            )
            .with_attribute(
                "egress",
                Value::List(vec![rule("-1", 0, "Allow all outbound traffic")]),
            ),
    );

    let cluster = stack.resource(
        Resource::new("aws.eks.cluster", "eks-cluster")
            .with_attribute("name", config.cluster_name.as_str())
            .with_attribute("role_arn", cluster_role.output("arn"))
            .with_attribute(
                "vpc_config",
                Value::map([
                    ("subnet_ids", subnets.output("ids")),
                    ("security_group_ids", Value::List(vec![security_group.output("id")])),
                    ("public_access_cidrs", Value::string_list(["0.0.0.0/0"])),
                ]),
            )
            .with_attribute(
                "tags",
                Value::map([("Name", Value::string(config.cluster_tag_name.as_str()))]),
            ),
    );

    let node_group = stack.resource(
        Resource::new("aws.eks.node_group", "eks-node-group")
            .with_attribute("cluster_name", cluster.output("name"))
            .with_attribute("node_group_name", config.node_group_name.as_str())
            .with_attribute("node_role_arn", node_role.output("arn"))
            .with_attribute("subnet_ids", subnets.output("ids"))
            .with_attribute(
                "scaling_config",
                Value::map([
                    ("desired_size", Value::Int(config.desired_size)),
                    ("min_size", Value::Int(config.min_size)),
                    ("max_size", Value::Int(config.max_size)),
                ]),
            ),
    );

    let kubeconfig = stack
        .all([
            cluster.output("name"),
            cluster.output("endpoint"),
            cluster.output("certificate_authority"),
        ])
        .apply("kubeconfig", kubeconfig::from_cluster_outputs);

    let k8s = stack.resource(
        Resource::new("kubernetes.provider", "k8sprovider")
            .with_attribute("kubeconfig", kubeconfig.value())
            .with_depends_on(node_group.binding()),
    );

    let chart = &config.chart;
    stack.resource(
        Resource::new("kubernetes.helm_release", chart.release_name.as_str())
            .with_attribute("name", chart.release_name.as_str())
            .with_attribute("chart", chart.chart.as_str())
            .with_attribute("version", chart.version.as_str())
            .with_attribute("repository", chart.repository.as_str())
            .with_attribute("namespace", chart.namespace.as_str())
            .with_attribute("create_namespace", true)
            .with_attribute(
                "values",
                Value::map([(
                    "minecraftServer",
                    Value::map([
                        ("eula", Value::Bool(true)),
                        ("motd", Value::string(chart.motd.as_str())),
                        ("serviceType", Value::string(chart.service_type.as_str())),
                    ]),
                )]),
            )
            .with_attribute("kubeconfig", k8s.output("kubeconfig")),
    );

    stack
}

/// Binding a resource attribute refers to, if it is a reference
fn referenced_binding<'a>(resource: &'a Resource, attribute: &str) -> Option<&'a str> {
    match resource.attributes.get(attribute) {
        Some(Value::ResourceRef(binding, _)) => Some(binding),
        _ => None,
    }
}

/// Ordering and permission gaps that are declared on purpose but worth
/// knowing about before an apply.
pub fn ordering_warnings(stack: &Stack) -> Result<Vec<String>, ApplyError> {
    let graph = stack.graph()?;
    let attachments_of = |role: &str| -> Vec<String> {
        stack
            .resources_of_type("aws.iam.role_policy_attachment")
            .filter(|a| referenced_binding(a, "role") == Some(role))
            .map(|a| a.binding().to_string())
            .collect()
    };

    let mut warnings = Vec::new();

    for cluster in stack.resources_of_type("aws.eks.cluster") {
        if let Some(role) = referenced_binding(cluster, "role_arn")
            && attachments_of(role).is_empty()
        {
            warnings.push(format!(
                "{} (role of {}) has no policy attachments; EKS expects AmazonEKSClusterPolicy",
                role,
                cluster.binding()
            ));
        }
    }

    for node_group in stack.resources_of_type("aws.eks.node_group") {
        let Some(role) = referenced_binding(node_group, "node_role_arn") else {
            continue;
        };
        let upstream = graph.transitive_dependencies(node_group.binding());
        let unordered: Vec<String> = attachments_of(role)
            .into_iter()
            .filter(|a| !upstream.contains(a))
            .collect();
        if !unordered.is_empty() {
            warnings.push(format!(
                "{} is not ordered after {}; nodes may start before their policies are attached",
                node_group.binding(),
                unordered.join(", ")
            ));
        }
    }

    Ok(warnings)
}
