//! IAM operations: roles and managed policy attachments

use std::collections::HashMap;

use craftstack_core::provider::{ProviderError, ProviderResult};
use craftstack_core::resource::{Resource, ResourceId, State, Value};
use log::debug;

use crate::{AwsProvider, required_str};

/// Separator between role name and policy ARN in an attachment identifier
const ATTACHMENT_SEPARATOR: char = '|';

impl AwsProvider {
    // ========== Role ==========

    /// Read an IAM Role by name
    pub(crate) async fn read_role(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required_str(resource, "name")?;

        let result = match self.iam_client.get_role().role_name(name).send().await {
            Ok(result) => result,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                return Ok(State::not_found(id));
            }
            Err(e) => {
                return Err(ProviderError::new(format!("Failed to get role: {:?}", e))
                    .for_resource(id));
            }
        };

        let Some(role) = result.role() else {
            return Ok(State::not_found(id));
        };

        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::string(role.role_name()));
        attributes.insert("arn".to_string(), Value::string(role.arn()));
        attributes.insert("role_id".to_string(), Value::string(role.role_id()));

        if let Some(encoded) = role.assume_role_policy_document() {
            let document = decode_policy_document(encoded).map_err(|e| {
                ProviderError::new(format!("Failed to decode trust policy: {}", e))
                    .for_resource(id.clone())
            })?;
            let desired = resource.get_str("assume_role_policy");
            attributes.insert(
                "assume_role_policy".to_string(),
                Value::String(normalize_policy(&document, desired)),
            );
        }

        Ok(State::existing(id, attributes).with_identifier(role.role_name()))
    }

    /// Create an IAM Role
    pub(crate) async fn create_role(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required_str(resource, "name")?;
        let policy = required_str(resource, "assume_role_policy")?;

        self.iam_client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(policy)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create role: {:?}", e))
                    .for_resource(id.clone())
            })?;

        self.read_role(resource).await
    }

    /// Update the trust policy of an IAM Role
    pub(crate) async fn update_role(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        if from.attributes.get("name") != to.attributes.get("name") {
            return Err(ProviderError::new(
                "Renaming a role requires replacement; delete and recreate it",
            )
            .for_resource(id.clone()));
        }
        let policy = required_str(to, "assume_role_policy")?;

        self.iam_client
            .update_assume_role_policy()
            .role_name(identifier)
            .policy_document(policy)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to update trust policy: {:?}", e))
                    .for_resource(id.clone())
            })?;

        self.read_role(to).await
    }

    /// Delete an IAM Role
    pub(crate) async fn delete_role(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        self.iam_client
            .delete_role()
            .role_name(identifier)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete role: {:?}", e))
                    .for_resource(id.clone())
            })?;

        Ok(())
    }

    // ========== Role Policy Attachment ==========

    /// Managed policy ARNs attached to a role, or None if the role does not exist
    async fn attached_policies(
        &self,
        id: &ResourceId,
        role: &str,
    ) -> ProviderResult<Option<Vec<String>>> {
        let mut arns = Vec::new();
        let mut marker = None;
        loop {
            let result = match self
                .iam_client
                .list_attached_role_policies()
                .role_name(role)
                .set_marker(marker)
                .send()
                .await
            {
                Ok(result) => result,
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_no_such_entity_exception()) =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "Failed to list attached role policies: {:?}",
                        e
                    ))
                    .for_resource(id.clone()));
                }
            };

            arns.extend(
                result
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(String::from)),
            );

            marker = result.marker().map(String::from);
            if !result.is_truncated() || marker.is_none() {
                break;
            }
        }
        Ok(Some(arns))
    }

    /// Read a Role Policy Attachment
    pub(crate) async fn read_role_policy_attachment(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        let (Some(role), Some(policy_arn)) =
            (resource.get_str("role"), resource.get_str("policy_arn"))
        else {
            return Ok(State::not_found(id));
        };

        let attached = self.attached_policies(&id, role).await?.unwrap_or_default();
        if !attached.iter().any(|arn| arn == policy_arn) {
            debug!("{} is not attached to {}", policy_arn, role);
            return Ok(State::not_found(id));
        }

        let mut attributes = HashMap::new();
        attributes.insert("role".to_string(), Value::string(role));
        attributes.insert("policy_arn".to_string(), Value::string(policy_arn));

        Ok(State::existing(id, attributes).with_identifier(attachment_identifier(role, policy_arn)))
    }

    /// Attach a managed policy to a role
    pub(crate) async fn create_role_policy_attachment(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        let role = required_str(resource, "role")?;
        let policy_arn = required_str(resource, "policy_arn")?;

        self.iam_client
            .attach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to attach role policy: {:?}", e))
                    .for_resource(id.clone())
            })?;

        self.read_role_policy_attachment(resource).await
    }

    /// Detach a managed policy from a role
    pub(crate) async fn delete_role_policy_attachment(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let (role, policy_arn) = parse_attachment_identifier(identifier).ok_or_else(|| {
            ProviderError::new(format!("Invalid attachment identifier: {}", identifier))
                .for_resource(id.clone())
        })?;

        self.iam_client
            .detach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to detach role policy: {:?}", e))
                    .for_resource(id.clone())
            })?;

        Ok(())
    }
}

pub fn attachment_identifier(role: &str, policy_arn: &str) -> String {
    format!("{}{}{}", role, ATTACHMENT_SEPARATOR, policy_arn)
}

pub fn parse_attachment_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier
        .split_once(ATTACHMENT_SEPARATOR)
        .filter(|(role, arn)| !role.is_empty() && !arn.is_empty())
}

/// IAM returns policy documents URL-encoded
pub fn decode_policy_document(encoded: &str) -> Result<String, String> {
    urlencoding::decode(encoded)
        .map(|s| s.into_owned())
        .map_err(|e| e.to_string())
}

/// Keep the declared document text when it is the same JSON as the actual one,
/// so formatting differences do not show up as drift.
pub fn normalize_policy(actual: &str, desired: Option<&str>) -> String {
    if let Some(desired) = desired
        && let (Ok(a), Ok(d)) = (
            serde_json::from_str::<serde_json::Value>(actual),
            serde_json::from_str::<serde_json::Value>(desired),
        )
        && a == d
    {
        return desired.to_string();
    }
    actual.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUST_POLICY: &str = r#"{
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "eks.amazonaws.com" },
            "Action": "sts:AssumeRole"
        }]
    }"#;

    #[test]
    fn test_decode_policy_document() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%7D";
        assert_eq!(
            decode_policy_document(encoded).unwrap(),
            r#"{"Version":"2012-10-17"}"#
        );
    }

    #[test]
    fn test_equivalent_policy_keeps_declared_text() {
        let compact = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"eks.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#;
        assert_eq!(normalize_policy(compact, Some(TRUST_POLICY)), TRUST_POLICY);
    }

    #[test]
    fn test_different_policy_reports_actual() {
        let other = r#"{"Version":"2012-10-17","Statement":[]}"#;
        assert_eq!(normalize_policy(other, Some(TRUST_POLICY)), other);
        assert_eq!(normalize_policy(other, None), other);
    }

    #[test]
    fn test_attachment_identifier() {
        let arn = "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy";
        let identifier = attachment_identifier("node-iam-role", arn);
        assert_eq!(
            parse_attachment_identifier(&identifier),
            Some(("node-iam-role", arn))
        );
        assert_eq!(parse_attachment_identifier("no-separator"), None);
        assert_eq!(parse_attachment_identifier("|arn"), None);
    }
}
