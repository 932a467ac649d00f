//! Topology constructs
//!
//! High-level declarations (network, security group, network ACL, outputs)
//! that expand into low-level [`Resource`](crate::resource::Resource)s when a
//! stack is synthesized.

pub mod acl;
pub mod network;
pub mod output;
pub mod security_group;

use crate::resource::Value;

pub use acl::{
    AclEntry, AclEntryProps, NetworkAcl, NetworkAclRef, PortRange, RuleAction,
    SubnetAclAssociation,
};
pub use network::{
    AvailabilityZone, Network, NetworkProps, NetworkRef, SubnetConfiguration, SubnetKind,
    SubnetRef,
};
pub use output::{Output, OutputProps};
pub use security_group::{
    Peer, Port, Protocol, Rule, SecurityGroup, SecurityGroupProps, SecurityGroupRef,
};

/// Traffic direction of a firewall rule
///
/// Ingress and egress rules live in independent namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Ingress,
    Egress,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Ingress => write!(f, "ingress"),
            Direction::Egress => write!(f, "egress"),
        }
    }
}

/// Resource type names produced by synthesis
pub mod kind {
    pub const VPC: &str = "vpc";
    pub const INTERNET_GATEWAY: &str = "internet_gateway";
    pub const VPC_GATEWAY_ATTACHMENT: &str = "vpc_gateway_attachment";
    pub const SUBNET: &str = "subnet";
    pub const ROUTE_TABLE: &str = "route_table";
    pub const SUBNET_ROUTE_TABLE_ASSOCIATION: &str = "subnet_route_table_association";
    pub const ROUTE: &str = "route";
    pub const EIP: &str = "eip";
    pub const NAT_GATEWAY: &str = "nat_gateway";
    pub const SECURITY_GROUP: &str = "security_group";
    pub const NETWORK_ACL: &str = "network_acl";
    pub const NETWORK_ACL_ENTRY: &str = "network_acl_entry";
    pub const SUBNET_NETWORK_ACL_ASSOCIATION: &str = "subnet_network_acl_association";

    pub const ALL: &[&str] = &[
        VPC,
        INTERNET_GATEWAY,
        VPC_GATEWAY_ATTACHMENT,
        SUBNET,
        ROUTE_TABLE,
        SUBNET_ROUTE_TABLE_ASSOCIATION,
        ROUTE,
        EIP,
        NAT_GATEWAY,
        SECURITY_GROUP,
        NETWORK_ACL,
        NETWORK_ACL_ENTRY,
        SUBNET_NETWORK_ACL_ASSOCIATION,
    ];
}

/// Tag list in provider form: `[{key, value}, ...]`
pub(crate) fn tags<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Value {
    Value::List(
        pairs
            .into_iter()
            .map(|(k, v)| Value::map([("key", Value::string(k)), ("value", Value::String(v))]))
            .collect(),
    )
}

/// Tag list holding only the `Name` tag
pub(crate) fn name_tag(path: String) -> Value {
    tags([("Name", path)])
}
