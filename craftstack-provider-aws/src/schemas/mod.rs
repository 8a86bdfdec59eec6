//! AWS resource schema definitions

pub mod ec2;
pub mod eks;
pub mod iam;

use craftstack_core::schema::ResourceSchema;

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(ec2::schemas());
    schemas.extend(iam::schemas());
    schemas.extend(eks::schemas());
    schemas
}
