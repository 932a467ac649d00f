//! Blueprint for the reference network stack
//!
//! Builds a network with public and private subnets over two availability
//! zones, one NAT gateway per zone, an instance security group with outbound
//! denied by default and a custom network ACL guarding the private subnets.

use crate::cidr;
use crate::config::NetworkStackConfig;
use crate::stack::{Environment, Stack, StackError};
use crate::topology::{
    AclEntry, AclEntryProps, Direction, Network, NetworkAcl, NetworkProps, Output, Peer, Port,
    PortRange, RuleAction, SecurityGroup, SecurityGroupProps, SubnetAclAssociation,
    SubnetConfiguration,
};

const TCP: i16 = 6;

pub fn network_stack(config: &NetworkStackConfig) -> Result<Stack, StackError> {
    let cidr = config
        .network_cidr()
        .map_err(|e| StackError::InvalidNetwork {
            network: config.network.id.clone(),
            reason: e.to_string(),
        })?;

    let environment = match &config.region {
        Some(region) => {
            Environment::new(region).with_availability_zones(config.availability_zones.clone())
        }
        None => Environment::agnostic(),
    };
    let mut stack = Stack::new(&config.stack_name).with_environment(environment);
    if let Some(description) = &config.description {
        stack = stack.with_description(description);
    }

    let network = Network::declare(
        &mut stack,
        &config.network.id,
        NetworkProps {
            cidr,
            max_azs: config.network.max_azs,
            nat_gateways: Some(config.network.nat_gateways),
            subnet_configuration: vec![
                SubnetConfiguration::public(config.network.public_subnet_name())
                    .with_cidr_mask(config.network.public_subnet.cidr_mask),
                SubnetConfiguration::private_with_egress(config.network.private_subnet_name())
                    .with_cidr_mask(config.network.private_subnet.cidr_mask),
            ],
            ..Default::default()
        },
    )?;

    let security_group = SecurityGroup::declare(
        &mut stack,
        &config.security_group.id,
        &network,
        SecurityGroupProps {
            description: config.security_group.description.clone(),
            allow_all_outbound: config.security_group.allow_all_outbound,
        },
    )?;
    stack.add_ingress_rule(&security_group, Peer::any_ipv4(), Port::tcp(22), "Allow SSH")?;
    stack.add_egress_rule(
        &security_group,
        Peer::any_ipv4(),
        Port::tcp(443),
        "Allow HTTPS Out",
    )?;

    let acl = NetworkAcl::declare(&mut stack, &config.network_acl.id, &network)?;
    AclEntry::declare(
        &mut stack,
        "InboundHttp",
        &acl,
        AclEntryProps {
            rule_number: 100,
            protocol: TCP,
            rule_action: RuleAction::Allow,
            direction: Direction::Ingress,
            cidr_block: cidr::any_ipv4(),
            port_range: Some(PortRange::single(80)),
        },
    )?;
    AclEntry::declare(
        &mut stack,
        "OutboundHttps",
        &acl,
        AclEntryProps {
            rule_number: 100,
            protocol: TCP,
            rule_action: RuleAction::Allow,
            direction: Direction::Egress,
            cidr_block: cidr::any_ipv4(),
            port_range: Some(PortRange::single(443)),
        },
    )?;

    // Public subnets keep the network's default ACL
    for (index, subnet) in network.private_subnets().iter().enumerate() {
        SubnetAclAssociation::declare(
            &mut stack,
            &format!("PrivateSubnetAclAssoc{}", index),
            &acl,
            subnet,
        )?;
    }

    Output::declare(&mut stack, "VpcId", network.vpc_id())?;
    Output::declare(&mut stack, "SecurityGroupId", security_group.group_id())?;

    Ok(stack)
}
