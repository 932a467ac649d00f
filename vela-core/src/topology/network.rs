//! Network - Virtual network with subnet groups spread over availability zones
//!
//! A network declaration owns its subnet groups. Each group gets one subnet
//! per selected availability zone. Public subnets route to an internet
//! gateway; private subnets route through a NAT gateway placed in a public
//! subnet.

use std::collections::HashSet;
use std::fmt;

use heck::ToUpperCamelCase;
use ipnetwork::Ipv4Network;

use crate::cidr::{self, AddressPlanner};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::resource::{Resource, Value};
use crate::stack::{Stack, StackError};
use crate::topology::{kind, name_tag, tags};

/// Routing class of a subnet group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetKind {
    /// Default route to the internet gateway
    Public,
    /// Default route to a NAT gateway
    PrivateWithEgress,
}

impl SubnetKind {
    fn label(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::PrivateWithEgress => "Private",
        }
    }
}

/// A named group of same-purpose subnets, one per availability zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    pub name: String,
    pub kind: SubnetKind,
    pub cidr_mask: u8,
}

impl SubnetConfiguration {
    pub const DEFAULT_CIDR_MASK: u8 = 24;

    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubnetKind::Public,
            cidr_mask: Self::DEFAULT_CIDR_MASK,
        }
    }

    pub fn private_with_egress(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubnetKind::PrivateWithEgress,
            cidr_mask: Self::DEFAULT_CIDR_MASK,
        }
    }

    pub fn with_cidr_mask(mut self, cidr_mask: u8) -> Self {
        self.cidr_mask = cidr_mask;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProps {
    pub cidr: Ipv4Network,
    pub max_azs: usize,
    /// Defaults to one NAT gateway per availability zone
    pub nat_gateways: Option<usize>,
    pub subnet_configuration: Vec<SubnetConfiguration>,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

impl Default for NetworkProps {
    fn default() -> Self {
        Self {
            cidr: cidr::default_network(),
            max_azs: 2,
            nat_gateways: None,
            subnet_configuration: vec![
                SubnetConfiguration::public("public"),
                SubnetConfiguration::private_with_egress("private"),
            ],
            enable_dns_hostnames: true,
            enable_dns_support: true,
        }
    }
}

/// An availability zone, either named or picked by index from the region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AvailabilityZone {
    Named(String),
    Indexed(usize),
}

impl AvailabilityZone {
    pub fn to_value(&self) -> Value {
        match self {
            AvailabilityZone::Named(name) => Value::String(name.clone()),
            AvailabilityZone::Indexed(i) => Value::AvailabilityZoneIndex(*i),
        }
    }
}

impl fmt::Display for AvailabilityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityZone::Named(name) => write!(f, "{}", name),
            AvailabilityZone::Indexed(i) => write!(f, "az[{}]", i),
        }
    }
}

/// Handle to a declared subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    /// Owning network id
    pub network: String,
    /// Subnet group name
    pub group: String,
    pub kind: SubnetKind,
    pub az_index: usize,
    pub availability_zone: AvailabilityZone,
    pub cidr: Ipv4Network,
    /// Logical id prefix shared by the subnet and its routing resources
    pub path: String,
}

impl SubnetRef {
    pub fn logical_id(&self) -> String {
        format!("{}Subnet", self.path)
    }

    pub fn subnet_id(&self) -> Value {
        Value::id_of(self.logical_id())
    }

    fn route_table_id(&self) -> String {
        format!("{}RouteTable", self.path)
    }

    fn association_id(&self) -> String {
        format!("{}RouteTableAssociation", self.path)
    }

    fn default_route_id(&self) -> String {
        format!("{}DefaultRoute", self.path)
    }

    fn eip_id(&self) -> String {
        format!("{}EIP", self.path)
    }

    fn nat_gateway_id(&self) -> String {
        format!("{}NATGateway", self.path)
    }
}

/// Handle to a declared network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub id: String,
    subnets: Vec<SubnetRef>,
}

impl NetworkRef {
    pub fn vpc_id(&self) -> Value {
        Value::id_of(&self.id)
    }

    pub fn subnets(&self) -> &[SubnetRef] {
        &self.subnets
    }

    pub fn public_subnets(&self) -> Vec<SubnetRef> {
        self.subnets_of(SubnetKind::Public)
    }

    pub fn private_subnets(&self) -> Vec<SubnetRef> {
        self.subnets_of(SubnetKind::PrivateWithEgress)
    }

    /// Subnets of one routing class, in availability zone order
    pub fn subnets_of(&self, kind: SubnetKind) -> Vec<SubnetRef> {
        self.subnets
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }
}

/// A declared network and its planned layout
#[derive(Debug, Clone)]
pub struct Network {
    pub id: String,
    pub props: NetworkProps,
    pub availability_zones: Vec<AvailabilityZone>,
    pub subnets: Vec<SubnetRef>,
    /// NAT gateways actually placed, one per zone starting from the first
    pub nat_gateway_count: usize,
}

impl Network {
    /// Declare a network in `stack`
    ///
    /// Subnet ranges are allocated immediately so that the returned handle can
    /// be used to reference individual subnets.
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        props: NetworkProps,
    ) -> Result<NetworkRef, StackError> {
        validate_props(id, &props)?;

        let availability_zones = stack.environment().select_zones(props.max_azs);
        let mut planner = AddressPlanner::new(props.cidr);
        let mut subnets = Vec::new();
        for group in &props.subnet_configuration {
            for (az_index, az) in availability_zones.iter().enumerate() {
                let cidr = planner
                    .allocate(group.cidr_mask)
                    .map_err(|source| StackError::Address {
                        network: id.to_string(),
                        source,
                    })?;
                subnets.push(SubnetRef {
                    network: id.to_string(),
                    group: group.name.clone(),
                    kind: group.kind,
                    az_index,
                    availability_zone: az.clone(),
                    cidr,
                    path: format!(
                        "{}{}{}",
                        id,
                        group.name.to_upper_camel_case(),
                        az_index + 1
                    ),
                });
            }
        }

        let zone_count = availability_zones.len();
        let has_private = props
            .subnet_configuration
            .iter()
            .any(|g| g.kind == SubnetKind::PrivateWithEgress);
        let placeable = if has_private { zone_count } else { 0 };
        let requested = props.nat_gateways.unwrap_or(placeable);
        let nat_gateway_count = requested.min(placeable);

        // Claimed last: a rejected declaration must not reserve the id
        stack.claim_id(id)?;

        if availability_zones.len() < props.max_azs {
            stack.report(Diagnostic::notice(DiagnosticKind::ZonesLimited {
                network: id.to_string(),
                requested: props.max_azs,
                available: availability_zones.len(),
            }));
        }
        if requested > placeable {
            stack.report(Diagnostic::warning(DiagnosticKind::ExcessNatGateways {
                network: id.to_string(),
                requested,
                placed: placeable,
            }));
        }
        if has_private && nat_gateway_count < zone_count {
            stack.report(Diagnostic::warning(DiagnosticKind::NatCoverageGap {
                network: id.to_string(),
                nat_gateways: nat_gateway_count,
                availability_zones: zone_count,
            }));
        }

        log::debug!(
            "declared network {} ({}) with {} subnets across {} zones and {} NAT gateway(s)",
            id,
            props.cidr,
            subnets.len(),
            zone_count,
            nat_gateway_count
        );

        let handle = NetworkRef {
            id: id.to_string(),
            subnets: subnets.clone(),
        };
        stack.networks.push(Network {
            id: id.to_string(),
            props,
            availability_zones,
            subnets,
            nat_gateway_count,
        });
        Ok(handle)
    }

    pub fn handle(&self) -> NetworkRef {
        NetworkRef {
            id: self.id.clone(),
            subnets: self.subnets.clone(),
        }
    }

    fn has_public_subnets(&self) -> bool {
        self.subnets.iter().any(|s| s.kind == SubnetKind::Public)
    }

    fn igw_id(&self) -> String {
        format!("{}IGW", self.id)
    }

    fn gateway_attachment_id(&self) -> String {
        format!("{}VPCGW", self.id)
    }

    /// Public subnets hosting a NAT gateway, in zone order
    fn nat_hosts(&self) -> Vec<&SubnetRef> {
        let first_public_group = self
            .props
            .subnet_configuration
            .iter()
            .find(|g| g.kind == SubnetKind::Public)
            .map(|g| g.name.as_str());

        self.subnets
            .iter()
            .filter(|s| Some(s.group.as_str()) == first_public_group)
            .take(self.nat_gateway_count)
            .collect()
    }

    /// Expand into low-level resources
    pub(crate) fn resources(&self, stack_name: &str) -> Vec<Resource> {
        let mut resources = Vec::new();

        resources.push(
            Resource::new(kind::VPC, &self.id)
                .with_attribute("cidr_block", Value::String(self.props.cidr.to_string()))
                .with_attribute(
                    "enable_dns_hostnames",
                    Value::Bool(self.props.enable_dns_hostnames),
                )
                .with_attribute(
                    "enable_dns_support",
                    Value::Bool(self.props.enable_dns_support),
                )
                .with_attribute("instance_tenancy", Value::string("default"))
                .with_attribute("tags", name_tag(format!("{}/{}", stack_name, self.id))),
        );

        let nat_hosts = self.nat_hosts();
        // Zones without their own NAT gateway borrow one round-robin
        let mut fallback = 0;

        for subnet in &self.subnets {
            let tag_path = format!(
                "{}/{}/{}{}",
                stack_name,
                self.id,
                subnet.group.to_upper_camel_case(),
                subnet.az_index + 1
            );

            resources.push(
                Resource::new(kind::SUBNET, subnet.logical_id())
                    .with_attribute("vpc_id", Value::id_of(&self.id))
                    .with_attribute("availability_zone", subnet.availability_zone.to_value())
                    .with_attribute("cidr_block", Value::String(subnet.cidr.to_string()))
                    .with_attribute(
                        "map_public_ip_on_launch",
                        Value::Bool(subnet.kind == SubnetKind::Public),
                    )
                    .with_attribute(
                        "tags",
                        tags([
                            ("Name", tag_path.clone()),
                            ("subnet-name", subnet.group.clone()),
                            ("subnet-type", subnet.kind.label().to_string()),
                        ]),
                    ),
            );
            resources.push(
                Resource::new(kind::ROUTE_TABLE, subnet.route_table_id())
                    .with_attribute("vpc_id", Value::id_of(&self.id))
                    .with_attribute("tags", name_tag(tag_path.clone())),
            );
            resources.push(
                Resource::new(kind::SUBNET_ROUTE_TABLE_ASSOCIATION, subnet.association_id())
                    .with_attribute("route_table_id", Value::id_of(subnet.route_table_id()))
                    .with_attribute("subnet_id", subnet.subnet_id()),
            );

            match subnet.kind {
                SubnetKind::Public => {
                    resources.push(
                        Resource::new(kind::ROUTE, subnet.default_route_id())
                            .with_attribute("route_table_id", Value::id_of(subnet.route_table_id()))
                            .with_attribute("destination_cidr_block", Value::string("0.0.0.0/0"))
                            .with_attribute("gateway_id", Value::id_of(self.igw_id()))
                            .with_dependency(self.gateway_attachment_id()),
                    );

                    if nat_hosts.iter().any(|h| h.path == subnet.path) {
                        resources.push(
                            Resource::new(kind::EIP, subnet.eip_id())
                                .with_attribute("domain", Value::string("vpc"))
                                .with_attribute("tags", name_tag(tag_path.clone())),
                        );
                        resources.push(
                            Resource::new(kind::NAT_GATEWAY, subnet.nat_gateway_id())
                                .with_attribute("subnet_id", subnet.subnet_id())
                                .with_attribute(
                                    "allocation_id",
                                    Value::attribute_of(subnet.eip_id(), "allocation_id"),
                                )
                                .with_attribute("tags", name_tag(tag_path))
                                .with_dependency(subnet.default_route_id())
                                .with_dependency(subnet.association_id()),
                        );
                    }
                }
                SubnetKind::PrivateWithEgress => {
                    let host = match nat_hosts.iter().find(|h| h.az_index == subnet.az_index) {
                        Some(host) => Some(*host),
                        None if !nat_hosts.is_empty() => {
                            let host = nat_hosts[fallback % nat_hosts.len()];
                            fallback += 1;
                            Some(host)
                        }
                        None => None,
                    };
                    if let Some(host) = host {
                        resources.push(
                            Resource::new(kind::ROUTE, subnet.default_route_id())
                                .with_attribute(
                                    "route_table_id",
                                    Value::id_of(subnet.route_table_id()),
                                )
                                .with_attribute(
                                    "destination_cidr_block",
                                    Value::string("0.0.0.0/0"),
                                )
                                .with_attribute("nat_gateway_id", Value::id_of(host.nat_gateway_id())),
                        );
                    }
                }
            }
        }

        if self.has_public_subnets() {
            resources.push(
                Resource::new(kind::INTERNET_GATEWAY, self.igw_id())
                    .with_attribute("tags", name_tag(format!("{}/{}", stack_name, self.id))),
            );
            resources.push(
                Resource::new(kind::VPC_GATEWAY_ATTACHMENT, self.gateway_attachment_id())
                    .with_attribute("vpc_id", Value::id_of(&self.id))
                    .with_attribute("internet_gateway_id", Value::id_of(self.igw_id())),
            );
        }

        resources
    }
}

fn validate_props(id: &str, props: &NetworkProps) -> Result<(), StackError> {
    let invalid = |reason: String| StackError::InvalidNetwork {
        network: id.to_string(),
        reason,
    };

    if props.max_azs == 0 {
        return Err(invalid("max_azs must be at least 1".to_string()));
    }
    if props.subnet_configuration.is_empty() {
        return Err(invalid("at least one subnet group is required".to_string()));
    }

    let mut names = HashSet::new();
    for group in &props.subnet_configuration {
        if group.name.is_empty() {
            return Err(invalid("subnet group names must not be empty".to_string()));
        }
        if !names.insert(group.name.to_upper_camel_case()) {
            return Err(invalid(format!(
                "subnet group name '{}' is used more than once",
                group.name
            )));
        }
    }

    let has_public = props
        .subnet_configuration
        .iter()
        .any(|g| g.kind == SubnetKind::Public);
    let has_private = props
        .subnet_configuration
        .iter()
        .any(|g| g.kind == SubnetKind::PrivateWithEgress);

    if has_private && !has_public {
        return Err(invalid(
            "private subnets with egress need a public subnet group to host NAT gateways"
                .to_string(),
        ));
    }
    if has_private && props.nat_gateways == Some(0) {
        return Err(invalid(
            "private subnets with egress need at least one NAT gateway".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    fn two_zone_props(nat_gateways: usize) -> NetworkProps {
        NetworkProps {
            max_azs: 2,
            nat_gateways: Some(nat_gateways),
            subnet_configuration: vec![
                SubnetConfiguration::public("public-subnet"),
                SubnetConfiguration::private_with_egress("private-subnet"),
            ],
            ..Default::default()
        }
    }

    fn count(resources: &[Resource], kind: &str) -> usize {
        resources.iter().filter(|r| r.resource_type() == kind).count()
    }

    #[test]
    fn subnets_per_group_match_zone_count() {
        let mut stack = Stack::new("Test");
        let network = Network::declare(&mut stack, "Vpc", two_zone_props(2)).unwrap();

        assert_eq!(network.public_subnets().len(), 2);
        assert_eq!(network.private_subnets().len(), 2);
        assert_eq!(network.subnets().len(), 4);

        let public: Vec<_> = network.public_subnets().iter().map(|s| s.cidr.to_string()).collect();
        let private: Vec<_> = network.private_subnets().iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(public, vec!["10.0.0.0/24", "10.0.1.0/24"]);
        assert_eq!(private, vec!["10.0.2.0/24", "10.0.3.0/24"]);
    }

    #[test]
    fn subnet_paths_follow_group_and_zone() {
        let mut stack = Stack::new("Test");
        let network = Network::declare(&mut stack, "CustomVPC", two_zone_props(2)).unwrap();

        let ids: Vec<_> = network.subnets().iter().map(|s| s.logical_id()).collect();
        assert_eq!(
            ids,
            vec![
                "CustomVPCPublicSubnet1Subnet",
                "CustomVPCPublicSubnet2Subnet",
                "CustomVPCPrivateSubnet1Subnet",
                "CustomVPCPrivateSubnet2Subnet",
            ]
        );
    }

    #[test]
    fn one_nat_gateway_per_zone() {
        let mut stack = Stack::new("Test");
        Network::declare(&mut stack, "Vpc", two_zone_props(2)).unwrap();
        assert!(stack.diagnostics().is_empty());

        let resources = stack.networks()[0].resources("Test");
        assert_eq!(count(&resources, kind::NAT_GATEWAY), 2);
        assert_eq!(count(&resources, kind::EIP), 2);
        assert_eq!(count(&resources, kind::ROUTE), 4);
        assert_eq!(count(&resources, kind::INTERNET_GATEWAY), 1);
        assert_eq!(count(&resources, kind::VPC_GATEWAY_ATTACHMENT), 1);
    }

    #[test]
    fn nat_shortfall_warns_and_shares_gateway() {
        let mut stack = Stack::new("Test");
        Network::declare(&mut stack, "Vpc", two_zone_props(1)).unwrap();

        assert!(stack.diagnostics().iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::NatCoverageGap {
                nat_gateways: 1,
                availability_zones: 2,
                ..
            }
        )));

        let resources = stack.networks()[0].resources("Test");
        assert_eq!(count(&resources, kind::NAT_GATEWAY), 1);

        let private_routes: Vec<_> = resources
            .iter()
            .filter(|r| r.attribute("nat_gateway_id").is_some())
            .collect();
        assert_eq!(private_routes.len(), 2);
        for route in private_routes {
            assert_eq!(
                route.attribute("nat_gateway_id"),
                Some(&Value::id_of("VpcPublicSubnet1NATGateway"))
            );
        }
    }

    #[test]
    fn excess_nat_gateways_are_capped() {
        let mut stack = Stack::new("Test");
        Network::declare(&mut stack, "Vpc", two_zone_props(3)).unwrap();

        assert_eq!(stack.networks()[0].nat_gateway_count, 2);
        assert!(stack.diagnostics().iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::ExcessNatGateways {
                requested: 3,
                placed: 2,
                ..
            }
        )));
    }

    #[test]
    fn public_route_waits_for_gateway_attachment() {
        let mut stack = Stack::new("Test");
        Network::declare(&mut stack, "Vpc", two_zone_props(2)).unwrap();

        let resources = stack.networks()[0].resources("Test");
        let route = resources
            .iter()
            .find(|r| r.logical_id() == "VpcPublicSubnet1DefaultRoute")
            .unwrap();
        assert_eq!(route.depends_on, vec!["VpcVPCGW".to_string()]);
    }

    #[test]
    fn named_zones_are_used_in_order() {
        let mut stack = Stack::new("Test").with_environment(
            Environment::new("eu-west-1").with_availability_zones(vec![
                "eu-west-1a".to_string(),
                "eu-west-1b".to_string(),
                "eu-west-1c".to_string(),
            ]),
        );
        let network = Network::declare(&mut stack, "Vpc", two_zone_props(2)).unwrap();

        assert_eq!(
            network.private_subnets()[1].availability_zone,
            AvailabilityZone::Named("eu-west-1b".to_string())
        );
    }

    #[test]
    fn agnostic_environment_limits_zones() {
        let mut stack = Stack::new("Test");
        let network = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                max_azs: 3,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(network.public_subnets().len(), 2);
        assert!(stack
            .diagnostics()
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::ZonesLimited { .. })));
    }

    #[test]
    fn private_without_public_is_rejected() {
        let mut stack = Stack::new("Test");
        let result = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                subnet_configuration: vec![SubnetConfiguration::private_with_egress("private")],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StackError::InvalidNetwork { .. })));
    }

    #[test]
    fn zero_nat_with_private_is_rejected() {
        let mut stack = Stack::new("Test");
        let result = Network::declare(&mut stack, "Vpc", two_zone_props(0));
        assert!(matches!(result, Err(StackError::InvalidNetwork { .. })));
    }

    #[test]
    fn duplicate_group_names_are_rejected() {
        let mut stack = Stack::new("Test");
        let result = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                subnet_configuration: vec![
                    SubnetConfiguration::public("web"),
                    SubnetConfiguration::public("web"),
                ],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StackError::InvalidNetwork { .. })));
    }

    #[test]
    fn exhausted_address_space_is_an_error() {
        let mut stack = Stack::new("Test");
        let result = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                cidr: "10.0.0.0/24".parse().unwrap(),
                max_azs: 2,
                subnet_configuration: vec![
                    SubnetConfiguration::public("public").with_cidr_mask(25),
                    SubnetConfiguration::private_with_egress("private").with_cidr_mask(25),
                ],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StackError::Address { .. })));
    }

    #[test]
    fn failed_declaration_does_not_reserve_id() {
        let mut stack = Stack::new("Test");
        let result = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                cidr: "10.0.0.0/24".parse().unwrap(),
                subnet_configuration: vec![
                    SubnetConfiguration::public("public").with_cidr_mask(25),
                    SubnetConfiguration::private_with_egress("private").with_cidr_mask(25),
                ],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StackError::Address { .. })));
        assert!(stack.networks().is_empty());
        assert!(stack.diagnostics().is_empty());

        let network = Network::declare(&mut stack, "Vpc", NetworkProps::default()).unwrap();
        assert_eq!(network.id, "Vpc");
        assert_eq!(stack.networks().len(), 1);
    }

    #[test]
    fn default_props_fit_agnostic_environment() {
        assert_eq!(NetworkProps::default().max_azs, 2);

        let mut stack = Stack::new("Test");
        let network = Network::declare(&mut stack, "Vpc", NetworkProps::default()).unwrap();
        assert_eq!(network.public_subnets().len(), 2);
        assert!(stack.diagnostics().is_empty());
    }

    #[test]
    fn public_only_network_has_no_nat() {
        let mut stack = Stack::new("Test");
        Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                max_azs: 2,
                subnet_configuration: vec![SubnetConfiguration::public("public")],
                ..Default::default()
            },
        )
        .unwrap();

        let resources = stack.networks()[0].resources("Test");
        assert_eq!(count(&resources, kind::NAT_GATEWAY), 0);
        assert_eq!(count(&resources, kind::INTERNET_GATEWAY), 1);
    }
}
