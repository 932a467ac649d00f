//! Security group and network ACL resource schemas

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use vela_core::topology::kind;

use super::{AwsSchemaConfig, tags_type};

/// Inline security group rule; `peer_key` names the group peer attribute
fn rule_type(peer_key: &str) -> AttributeType {
    AttributeType::Struct(vec![
        AttributeSchema::new("ip_protocol", AttributeType::String).required(),
        AttributeSchema::new("from_port", types::port_number()),
        AttributeSchema::new("to_port", types::port_number()),
        AttributeSchema::new("cidr_ip", types::cidr()),
        AttributeSchema::new(peer_key, AttributeType::String),
        AttributeSchema::new("description", AttributeType::String),
    ])
}

pub fn security_group_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroup",
        resource_type: kind::SECURITY_GROUP,
        schema: ResourceSchema::new(kind::SECURITY_GROUP)
            .attribute(AttributeSchema::new("group_description", AttributeType::String).required())
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String))
            .attribute(AttributeSchema::new(
                "security_group_ingress",
                AttributeType::List(Box::new(rule_type("source_security_group_id"))),
            ))
            .attribute(AttributeSchema::new(
                "security_group_egress",
                AttributeType::List(Box::new(rule_type("destination_security_group_id"))),
            ))
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn network_acl_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::NetworkAcl",
        resource_type: kind::NETWORK_ACL,
        schema: ResourceSchema::new(kind::NETWORK_ACL)
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn network_acl_entry_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::NetworkAclEntry",
        resource_type: kind::NETWORK_ACL_ENTRY,
        schema: ResourceSchema::new(kind::NETWORK_ACL_ENTRY)
            .attribute(AttributeSchema::new("network_acl_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("rule_number", types::rule_number()).required())
            .attribute(AttributeSchema::new("protocol", types::protocol_number()).required())
            .attribute(
                AttributeSchema::new(
                    "rule_action",
                    AttributeType::Enum(vec!["allow".to_string(), "deny".to_string()]),
                )
                .required(),
            )
            .attribute(AttributeSchema::new("egress", AttributeType::Bool))
            .attribute(AttributeSchema::new("cidr_block", types::cidr()))
            .attribute(AttributeSchema::new(
                "port_range",
                AttributeType::Struct(vec![
                    AttributeSchema::new("from", types::port_number()).required(),
                    AttributeSchema::new("to", types::port_number()).required(),
                ]),
            )),
    }
}

pub fn subnet_network_acl_association_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::SubnetNetworkAclAssociation",
        resource_type: kind::SUBNET_NETWORK_ACL_ASSOCIATION,
        schema: ResourceSchema::new(kind::SUBNET_NETWORK_ACL_ASSOCIATION)
            .attribute(AttributeSchema::new("network_acl_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("subnet_id", AttributeType::String).required()),
    }
}
