//! VPC, subnet and routing resource schemas

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use vela_core::topology::kind;

use super::{AwsSchemaConfig, tags_type};

fn enum_type(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

pub fn vpc_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::VPC",
        resource_type: kind::VPC,
        schema: ResourceSchema::new(kind::VPC)
            .with_description("A virtual private cloud")
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_description("The IPv4 network range for the VPC"),
            )
            .attribute(AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool))
            .attribute(AttributeSchema::new("enable_dns_support", AttributeType::Bool))
            .attribute(AttributeSchema::new(
                "instance_tenancy",
                enum_type(&["default", "dedicated", "host"]),
            ))
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn internet_gateway_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::InternetGateway",
        resource_type: kind::INTERNET_GATEWAY,
        schema: ResourceSchema::new(kind::INTERNET_GATEWAY)
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn vpc_gateway_attachment_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::VPCGatewayAttachment",
        resource_type: kind::VPC_GATEWAY_ATTACHMENT,
        schema: ResourceSchema::new(kind::VPC_GATEWAY_ATTACHMENT)
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("internet_gateway_id", AttributeType::String)),
    }
}

pub fn subnet_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::Subnet",
        resource_type: kind::SUBNET,
        schema: ResourceSchema::new(kind::SUBNET)
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .with_description("Zone name, or a zone picked by index from the region"),
            )
            .attribute(AttributeSchema::new("cidr_block", types::cidr()).required())
            .attribute(AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool))
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn route_table_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::RouteTable",
        resource_type: kind::ROUTE_TABLE,
        schema: ResourceSchema::new(kind::ROUTE_TABLE)
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn subnet_route_table_association_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::SubnetRouteTableAssociation",
        resource_type: kind::SUBNET_ROUTE_TABLE_ASSOCIATION,
        schema: ResourceSchema::new(kind::SUBNET_ROUTE_TABLE_ASSOCIATION)
            .attribute(AttributeSchema::new("route_table_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("subnet_id", AttributeType::String).required()),
    }
}

pub fn route_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::Route",
        resource_type: kind::ROUTE,
        schema: ResourceSchema::new(kind::ROUTE)
            .attribute(AttributeSchema::new("route_table_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("destination_cidr_block", types::cidr()))
            .attribute(AttributeSchema::new("gateway_id", AttributeType::String))
            .attribute(AttributeSchema::new("nat_gateway_id", AttributeType::String)),
    }
}

pub fn eip_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::EIP",
        resource_type: kind::EIP,
        schema: ResourceSchema::new(kind::EIP)
            .attribute(AttributeSchema::new("domain", enum_type(&["vpc", "standard"])))
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}

pub fn nat_gateway_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::EC2::NatGateway",
        resource_type: kind::NAT_GATEWAY,
        schema: ResourceSchema::new(kind::NAT_GATEWAY)
            .with_description("A NAT gateway in a public subnet")
            .attribute(AttributeSchema::new("subnet_id", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("allocation_id", AttributeType::String)
                    .with_description("The allocation ID of the Elastic IP address"),
            )
            .attribute(AttributeSchema::new(
                "connectivity_type",
                enum_type(&["public", "private"]),
            ))
            .attribute(AttributeSchema::new("tags", tags_type())),
    }
}
