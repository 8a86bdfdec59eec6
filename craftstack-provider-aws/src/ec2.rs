//! EC2 operations: default VPC and subnet lookups, security groups

use std::collections::HashMap;

use aws_sdk_ec2::types::{Filter, IpPermission, IpRange, Tag};
use craftstack_core::provider::{ProviderError, ProviderResult};
use craftstack_core::resource::{Resource, ResourceId, State, Value};
use log::debug;

use crate::{AwsProvider, required_str};

/// Protocol value AWS uses for "all traffic"
pub const ALL_PROTOCOLS: &str = "-1";

impl AwsProvider {
    // ========== Default VPC lookup ==========

    pub(crate) async fn read_default_vpc(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let is_default = resource
            .attributes
            .get("default")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let filter = Filter::builder()
            .name("isDefault")
            .values(is_default.to_string())
            .build();

        let result = self
            .ec2_client
            .describe_vpcs()
            .filters(filter)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to describe VPCs: {:?}", e))
                    .for_resource(id.clone())
            })?;

        let Some(vpc_id) = result.vpcs().first().and_then(|vpc| vpc.vpc_id()) else {
            return Ok(State::not_found(id));
        };
        debug!("Found default VPC {}", vpc_id);

        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::string(vpc_id));
        attributes.insert("default".to_string(), Value::Bool(is_default));
        if let Some(cidr) = result.vpcs().first().and_then(|vpc| vpc.cidr_block()) {
            attributes.insert("cidr_block".to_string(), Value::string(cidr));
        }

        Ok(State::existing(id, attributes).with_identifier(vpc_id))
    }

    // ========== Subnet lookup ==========

    /// Every subnet of the VPC, in the order EC2 returns them
    pub(crate) async fn read_subnets(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let vpc_id = required_str(resource, "vpc_id")?;

        let filter = Filter::builder().name("vpc-id").values(vpc_id).build();

        let mut ids = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .ec2_client
                .describe_subnets()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to describe subnets: {:?}", e))
                        .for_resource(id.clone())
                })?;

            ids.extend(
                result
                    .subnets()
                    .iter()
                    .filter_map(|s| s.subnet_id().map(String::from)),
            );

            next_token = result.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        debug!("Found {} subnets in {}", ids.len(), vpc_id);

        let mut attributes = HashMap::new();
        attributes.insert("vpc_id".to_string(), Value::string(vpc_id));
        attributes.insert("ids".to_string(), Value::string_list(ids));

        Ok(State::existing(id, attributes).with_identifier(vpc_id))
    }

    // ========== Security Group ==========

    /// Read a Security Group by group name within its VPC
    pub(crate) async fn read_security_group(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let (Some(name), Some(vpc_id)) = (resource.get_str("name"), resource.get_str("vpc_id"))
        else {
            // The VPC is not known yet, so the group cannot exist
            return Ok(State::not_found(id));
        };

        let result = self
            .ec2_client
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to describe security groups: {:?}", e))
                    .for_resource(id.clone())
            })?;

        let Some(sg) = result.security_groups().first() else {
            return Ok(State::not_found(id));
        };

        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::string(name));
        if let Some(desc) = sg.description() {
            attributes.insert("description".to_string(), Value::string(desc));
        }
        if let Some(vpc_id) = sg.vpc_id() {
            attributes.insert("vpc_id".to_string(), Value::string(vpc_id));
        }
        attributes.insert(
            "ingress".to_string(),
            Value::List(sg.ip_permissions().iter().flat_map(rules_from_permission).collect()),
        );
        attributes.insert(
            "egress".to_string(),
            Value::List(
                sg.ip_permissions_egress()
                    .iter()
                    .flat_map(rules_from_permission)
                    .collect(),
            ),
        );

        let mut state = State::existing(id, attributes);
        if let Some(sg_id) = sg.group_id() {
            state
                .attributes
                .insert("id".to_string(), Value::string(sg_id));
            state = state.with_identifier(sg_id);
        }
        Ok(state)
    }

    /// Create a Security Group with exactly the declared rules
    pub(crate) async fn create_security_group(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required_str(resource, "name")?;
        let vpc_id = required_str(resource, "vpc_id")?;
        // Use name as description if not specified
        let description = resource.get_str("description").unwrap_or(name);

        let ingress = permissions(resource, "ingress")?;
        let egress = permissions(resource, "egress")?;

        let result = self
            .ec2_client
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create security group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        let sg_id = result.group_id().ok_or_else(|| {
            ProviderError::new("Security Group created but no ID returned").for_resource(id.clone())
        })?;

        self.ec2_client
            .create_tags()
            .resources(sg_id)
            .tags(Tag::builder().key("Name").value(name).build())
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to tag security group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        // EC2 adds an allow-all egress rule to every new group; replace it with the declared ones
        self.ec2_client
            .revoke_security_group_egress()
            .group_id(sg_id)
            .ip_permissions(allow_all_permission())
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to revoke default egress rule: {:?}", e))
                    .for_resource(id.clone())
            })?;

        self.authorize_rules(&id, sg_id, ingress, egress).await?;

        self.read_security_group(resource).await
    }

    /// Replace the rules of an existing Security Group
    pub(crate) async fn update_security_group(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        for immutable in ["name", "description", "vpc_id"] {
            if from.attributes.get(immutable) != to.attributes.get(immutable) {
                return Err(ProviderError::new(format!(
                    "Changing {} requires replacing the security group; delete and recreate it",
                    immutable
                ))
                .for_resource(id.clone()));
            }
        }

        let ingress = permissions(to, "ingress")?;
        let egress = permissions(to, "egress")?;
        let current_ingress = from_state_permissions(id, from, "ingress")?;
        let current_egress = from_state_permissions(id, from, "egress")?;

        if !current_ingress.is_empty() {
            self.ec2_client
                .revoke_security_group_ingress()
                .group_id(identifier)
                .set_ip_permissions(Some(current_ingress))
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to revoke ingress rules: {:?}", e))
                        .for_resource(id.clone())
                })?;
        }
        if !current_egress.is_empty() {
            self.ec2_client
                .revoke_security_group_egress()
                .group_id(identifier)
                .set_ip_permissions(Some(current_egress))
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to revoke egress rules: {:?}", e))
                        .for_resource(id.clone())
                })?;
        }

        self.authorize_rules(id, identifier, ingress, egress).await?;

        self.read_security_group(to).await
    }

    async fn authorize_rules(
        &self,
        id: &ResourceId,
        sg_id: &str,
        ingress: Vec<IpPermission>,
        egress: Vec<IpPermission>,
    ) -> ProviderResult<()> {
        if !ingress.is_empty() {
            self.ec2_client
                .authorize_security_group_ingress()
                .group_id(sg_id)
                .set_ip_permissions(Some(ingress))
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to create ingress rules: {:?}", e))
                        .for_resource(id.clone())
                })?;
        }
        if !egress.is_empty() {
            self.ec2_client
                .authorize_security_group_egress()
                .group_id(sg_id)
                .set_ip_permissions(Some(egress))
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to create egress rules: {:?}", e))
                        .for_resource(id.clone())
                })?;
        }
        Ok(())
    }

    /// Delete a Security Group by its group id
    pub(crate) async fn delete_security_group(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        self.ec2_client
            .delete_security_group()
            .group_id(identifier)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete security group: {:?}", e))
                    .for_resource(id.clone())
            })?;

        Ok(())
    }
}

fn allow_all_permission() -> IpPermission {
    IpPermission::builder()
        .ip_protocol(ALL_PROTOCOLS)
        .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
        .build()
}

fn permissions(resource: &Resource, key: &str) -> ProviderResult<Vec<IpPermission>> {
    resource
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .map(|rule| {
            rule_to_permission(rule).map_err(|e| {
                ProviderError::new(format!("Invalid {} rule: {}", key, e))
                    .for_resource(resource.id.clone())
            })
        })
        .collect()
}

fn from_state_permissions(
    id: &ResourceId,
    state: &State,
    key: &str,
) -> ProviderResult<Vec<IpPermission>> {
    state
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .map(|rule| {
            rule_to_permission(rule).map_err(|e| {
                ProviderError::new(format!("Unexpected {} rule in current state: {}", key, e))
                    .for_resource(id.clone())
            })
        })
        .collect()
}

/// Convert a declared rule map into an EC2 IpPermission
pub fn rule_to_permission(rule: &Value) -> Result<IpPermission, String> {
    let protocol = rule
        .get("protocol")
        .and_then(Value::as_str)
        .ok_or("protocol is required")?;
    let description = rule.get("description").and_then(Value::as_str);

    let ranges = rule
        .get("cidr_blocks")
        .map(Value::strings)
        .unwrap_or_default()
        .into_iter()
        .map(|cidr| {
            IpRange::builder()
                .cidr_ip(cidr)
                .set_description(description.map(String::from))
                .build()
        })
        .collect();

    let mut builder = IpPermission::builder()
        .ip_protocol(protocol)
        .set_ip_ranges(Some(ranges));

    // Ports do not apply when every protocol is allowed
    if protocol != ALL_PROTOCOLS {
        let port = |key: &str| -> Result<i32, String> {
            let n = rule
                .get(key)
                .and_then(Value::as_int)
                .ok_or_else(|| format!("{} is required for protocol {}", key, protocol))?;
            i32::try_from(n).map_err(|_| format!("{} {} is out of range", key, n))
        };
        builder = builder.from_port(port("from_port")?).to_port(port("to_port")?);
    }

    Ok(builder.build())
}

/// Convert an EC2 IpPermission into rule maps, one per description.
/// Ports missing from the response (protocol "-1") read as 0.
pub fn rules_from_permission(permission: &IpPermission) -> Vec<Value> {
    let protocol = permission.ip_protocol().unwrap_or(ALL_PROTOCOLS);
    let from_port = permission.from_port().unwrap_or(0);
    let to_port = permission.to_port().unwrap_or(0);
    let (from_port, to_port) = if protocol == ALL_PROTOCOLS {
        (0, 0)
    } else {
        (from_port, to_port)
    };

    // Group CIDRs sharing a description, keeping first-seen order
    let mut groups: Vec<(Option<&str>, Vec<&str>)> = Vec::new();
    for range in permission.ip_ranges() {
        let Some(cidr) = range.cidr_ip() else {
            continue;
        };
        match groups.iter_mut().find(|(d, _)| *d == range.description()) {
            Some((_, cidrs)) => cidrs.push(cidr),
            None => groups.push((range.description(), vec![cidr])),
        }
    }

    groups
        .into_iter()
        .map(|(description, cidrs)| {
            let mut rule = vec![
                ("protocol", Value::string(protocol)),
                ("from_port", Value::Int(i64::from(from_port))),
                ("to_port", Value::Int(i64::from(to_port))),
                ("cidr_blocks", Value::string_list(cidrs)),
            ];
            if let Some(description) = description {
                rule.push(("description", Value::string(description)));
            }
            Value::map(rule)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minecraft_rule() -> Value {
        Value::map([
            ("protocol", Value::string("tcp")),
            ("from_port", Value::Int(25565)),
            ("to_port", Value::Int(25565)),
            ("cidr_blocks", Value::string_list(["0.0.0.0/0"])),
            ("description", Value::string("Allow Minecraft from VPC")),
        ])
    }

    #[test]
    fn test_rule_to_permission() {
        let permission = rule_to_permission(&minecraft_rule()).unwrap();
        assert_eq!(permission.ip_protocol(), Some("tcp"));
        assert_eq!(permission.from_port(), Some(25565));
        assert_eq!(permission.to_port(), Some(25565));
        assert_eq!(permission.ip_ranges().len(), 1);
        assert_eq!(permission.ip_ranges()[0].cidr_ip(), Some("0.0.0.0/0"));
        assert_eq!(
            permission.ip_ranges()[0].description(),
            Some("Allow Minecraft from VPC")
        );
    }

    #[test]
    fn test_all_protocols_has_no_ports() {
        let rule = Value::map([
            ("protocol", Value::string("-1")),
            ("from_port", Value::Int(0)),
            ("to_port", Value::Int(0)),
            ("cidr_blocks", Value::string_list(["0.0.0.0/0"])),
        ]);
        let permission = rule_to_permission(&rule).unwrap();
        assert_eq!(permission.ip_protocol(), Some("-1"));
        assert_eq!(permission.from_port(), None);
        assert_eq!(permission.to_port(), None);
    }

    #[test]
    fn test_rule_requires_ports() {
        let rule = Value::map([("protocol", Value::string("tcp"))]);
        let err = rule_to_permission(&rule).unwrap_err();
        assert!(err.contains("from_port"));

        let rule = Value::map([
            ("protocol", Value::string("tcp")),
            ("from_port", Value::Int(1 << 40)),
            ("to_port", Value::Int(80)),
        ]);
        assert!(rule_to_permission(&rule).unwrap_err().contains("out of range"));
    }

    #[test]
    fn test_permission_reads_back_as_declared_rule() {
        let permission = rule_to_permission(&minecraft_rule()).unwrap();
        assert_eq!(rules_from_permission(&permission), vec![minecraft_rule()]);
    }

    #[test]
    fn test_all_traffic_reads_as_zero_ports() {
        let permission = allow_all_permission();
        let rules = rules_from_permission(&permission);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].get("protocol"), Some(&Value::string("-1")));
        assert_eq!(rules[0].get("from_port"), Some(&Value::Int(0)));
        assert_eq!(rules[0].get("to_port"), Some(&Value::Int(0)));
        assert_eq!(rules[0].get("description"), None);
    }

    #[test]
    fn test_ranges_with_different_descriptions_split() {
        let permission = IpPermission::builder()
            .ip_protocol("tcp")
            .from_port(22)
            .to_port(22)
            .ip_ranges(IpRange::builder().cidr_ip("10.0.0.0/8").description("a").build())
            .ip_ranges(IpRange::builder().cidr_ip("10.1.0.0/16").description("b").build())
            .ip_ranges(IpRange::builder().cidr_ip("10.2.0.0/16").description("a").build())
            .build();

        let rules = rules_from_permission(&permission);
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[0].get("cidr_blocks"),
            Some(&Value::string_list(["10.0.0.0/8", "10.2.0.0/16"]))
        );
        assert_eq!(rules[1].get("description"), Some(&Value::string("b")));
    }
}
