//! Resource schemas for the AWS resource types produced by synthesis
//!
//! Attribute names are the core's snake_case names; they are converted to
//! CloudFormation property names when a template is rendered.

mod network;
mod security;

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Schema configuration for one resource type
///
/// Combines the ResourceSchema with the CloudFormation type it renders as.
pub struct AwsSchemaConfig {
    /// AWS CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    /// Core resource type (e.g., "vpc")
    pub resource_type: &'static str,
    /// The resource schema with attribute definitions
    pub schema: ResourceSchema,
}

/// Tags in CloudFormation form: a list of `{key, value}` pairs
pub fn tags_type() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::Struct(vec![
        AttributeSchema::new("key", AttributeType::String).required(),
        AttributeSchema::new("value", AttributeType::String).required(),
    ])))
}

/// Returns all schema configs
pub fn configs() -> Vec<AwsSchemaConfig> {
    vec![
        network::vpc_config(),
        network::internet_gateway_config(),
        network::vpc_gateway_attachment_config(),
        network::subnet_config(),
        network::route_table_config(),
        network::subnet_route_table_association_config(),
        network::route_config(),
        network::eip_config(),
        network::nat_gateway_config(),
        security::security_group_config(),
        security::network_acl_config(),
        security::network_acl_entry_config(),
        security::subnet_network_acl_association_config(),
    ]
}

/// Look up the config for a core resource type
pub fn config_for(resource_type: &str) -> Option<AwsSchemaConfig> {
    configs()
        .into_iter()
        .find(|c| c.resource_type == resource_type)
}
