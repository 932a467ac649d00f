//! Network ACL - Stateless subnet-level firewall
//!
//! Entries are evaluated in ascending rule number, separately for each
//! direction, and evaluation stops at the first match. Traffic matching no
//! entry is denied.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::resource::{Resource, Value};
use crate::stack::{Stack, StackError};
use crate::topology::{Direction, NetworkRef, SubnetRef, kind, name_tag};

pub const MIN_RULE_NUMBER: u16 = 1;
pub const MAX_RULE_NUMBER: u16 = 32766;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Allow,
    Deny,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub fn new(from: u16, to: u16) -> Self {
        Self { from, to }
    }

    pub fn single(port: u16) -> Self {
        Self::new(port, port)
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.from..=self.to).contains(&port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntryProps {
    /// Evaluation priority, lower first
    pub rule_number: u16,
    /// IANA protocol number, -1 for all
    pub protocol: i16,
    pub rule_action: RuleAction,
    pub direction: Direction,
    pub cidr_block: Ipv4Network,
    /// Required for TCP (6) and UDP (17)
    pub port_range: Option<PortRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub id: String,
    pub props: AclEntryProps,
}

impl AclEntry {
    /// Declare an entry in `acl`
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        acl: &NetworkAclRef,
        props: AclEntryProps,
    ) -> Result<(), StackError> {
        validate_entry(id, &props)?;

        let existing = stack.network_acl(&acl.id)?;
        if existing.entries.iter().any(|e| {
            e.props.direction == props.direction && e.props.rule_number == props.rule_number
        }) {
            return Err(StackError::DuplicateAclRule {
                acl: acl.id.clone(),
                direction: props.direction,
                rule_number: props.rule_number,
            });
        }

        stack.claim_id(id)?;
        log::debug!(
            "declared {} rule #{} ({}) in network ACL {}",
            props.direction,
            props.rule_number,
            props.rule_action.as_str(),
            acl.id
        );

        stack.network_acl_mut(&acl.id)?.entries.push(AclEntry {
            id: id.to_string(),
            props,
        });
        Ok(())
    }

    fn matches(&self, protocol: i16, port: Option<u16>, addr: Ipv4Addr) -> bool {
        let props = &self.props;
        if props.protocol != -1 && props.protocol != protocol {
            return false;
        }
        if !props.cidr_block.contains(addr) {
            return false;
        }
        match props.port_range {
            Some(range) => port.is_some_and(|p| range.contains(p)),
            None => true,
        }
    }

    fn resource(&self, acl_id: &str) -> Resource {
        let props = &self.props;
        let mut resource = Resource::new(kind::NETWORK_ACL_ENTRY, &self.id)
            .with_attribute("network_acl_id", Value::id_of(acl_id))
            .with_attribute("rule_number", Value::Int(i64::from(props.rule_number)))
            .with_attribute("protocol", Value::Int(i64::from(props.protocol)))
            .with_attribute("rule_action", Value::string(props.rule_action.as_str()))
            .with_attribute("egress", Value::Bool(props.direction == Direction::Egress))
            .with_attribute("cidr_block", Value::String(props.cidr_block.to_string()));
        if let Some(range) = props.port_range {
            resource = resource.with_attribute(
                "port_range",
                Value::map([
                    ("from", Value::Int(i64::from(range.from))),
                    ("to", Value::Int(i64::from(range.to))),
                ]),
            );
        }
        resource
    }
}

fn validate_entry(id: &str, props: &AclEntryProps) -> Result<(), StackError> {
    if !(MIN_RULE_NUMBER..=MAX_RULE_NUMBER).contains(&props.rule_number) {
        return Err(StackError::InvalidRuleNumber {
            entry: id.to_string(),
            rule_number: props.rule_number,
        });
    }
    if !(-1..=255).contains(&props.protocol) {
        return Err(StackError::InvalidProtocol {
            entry: id.to_string(),
            protocol: props.protocol,
        });
    }
    match props.port_range {
        None if props.protocol == 6 || props.protocol == 17 => {
            Err(StackError::MissingPortRange {
                entry: id.to_string(),
                protocol: props.protocol,
            })
        }
        Some(range) if range.from > range.to => Err(StackError::InvalidPortRange {
            subject: id.to_string(),
            from: i32::from(range.from),
            to: i32::from(range.to),
        }),
        _ => Ok(()),
    }
}

/// Handle to a declared network ACL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAclRef {
    pub id: String,
    pub network: String,
}

impl NetworkAclRef {
    pub fn network_acl_id(&self) -> Value {
        Value::id_of(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkAcl {
    pub id: String,
    pub network: String,
    pub entries: Vec<AclEntry>,
}

impl NetworkAcl {
    /// Declare a custom network ACL; it guards no subnet until associated
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        network: &NetworkRef,
    ) -> Result<NetworkAclRef, StackError> {
        stack.require_network(&network.id)?;
        stack.claim_id(id)?;
        log::debug!("declared network ACL {} in {}", id, network.id);

        stack.acls.push(NetworkAcl {
            id: id.to_string(),
            network: network.id.clone(),
            entries: Vec::new(),
        });
        Ok(NetworkAclRef {
            id: id.to_string(),
            network: network.id.clone(),
        })
    }

    /// Entries of one direction in evaluation order
    pub fn entries_for(&self, direction: Direction) -> Vec<&AclEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.props.direction == direction)
            .collect();
        entries.sort_by_key(|e| e.props.rule_number);
        entries
    }

    /// Decide the fate of a packet; unmatched traffic is denied
    pub fn evaluate(
        &self,
        direction: Direction,
        protocol: i16,
        port: Option<u16>,
        addr: Ipv4Addr,
    ) -> RuleAction {
        self.entries_for(direction)
            .into_iter()
            .find(|e| e.matches(protocol, port, addr))
            .map_or(RuleAction::Deny, |e| e.props.rule_action)
    }

    pub(crate) fn resources(&self, stack_name: &str) -> Vec<Resource> {
        let mut resources = vec![
            Resource::new(kind::NETWORK_ACL, &self.id)
                .with_attribute("vpc_id", Value::id_of(&self.network))
                .with_attribute("tags", name_tag(format!("{}/{}", stack_name, self.id))),
        ];
        resources.extend(self.entries.iter().map(|e| e.resource(&self.id)));
        resources
    }
}

/// Binding of one custom ACL to one subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetAclAssociation {
    pub id: String,
    pub acl: String,
    pub subnet: SubnetRef,
}

impl SubnetAclAssociation {
    /// Associate `acl` with `subnet`, replacing the subnet's default ACL
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        acl: &NetworkAclRef,
        subnet: &SubnetRef,
    ) -> Result<(), StackError> {
        stack.network_acl(&acl.id)?;
        let network = stack.require_network(&subnet.network)?;
        if !network.subnets.iter().any(|s| s.path == subnet.path) {
            return Err(StackError::UnknownReference {
                kind: "subnet",
                id: subnet.logical_id(),
            });
        }
        if subnet.network != acl.network {
            return Err(StackError::ForeignSubnet {
                subnet: subnet.logical_id(),
                subnet_network: subnet.network.clone(),
                acl: acl.id.clone(),
                acl_network: acl.network.clone(),
            });
        }
        if let Some(existing) = stack
            .associations
            .iter()
            .find(|a| a.subnet.path == subnet.path)
        {
            return Err(StackError::SubnetAlreadyAssociated {
                subnet: subnet.logical_id(),
                acl: existing.acl.clone(),
            });
        }

        stack.claim_id(id)?;
        log::debug!(
            "associated network ACL {} with subnet {}",
            acl.id,
            subnet.logical_id()
        );
        stack.associations.push(SubnetAclAssociation {
            id: id.to_string(),
            acl: acl.id.clone(),
            subnet: subnet.clone(),
        });
        Ok(())
    }

    pub(crate) fn resource(&self) -> Resource {
        Resource::new(kind::SUBNET_NETWORK_ACL_ASSOCIATION, &self.id)
            .with_attribute("network_acl_id", Value::id_of(&self.acl))
            .with_attribute("subnet_id", self.subnet.subnet_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cidr::any_ipv4;
    use crate::topology::{Network, NetworkProps};

    fn setup() -> (Stack, NetworkRef, NetworkAclRef) {
        let mut stack = Stack::new("Test");
        let network = Network::declare(
            &mut stack,
            "Vpc",
            NetworkProps {
                max_azs: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let acl = NetworkAcl::declare(&mut stack, "Acl", &network).unwrap();
        (stack, network, acl)
    }

    fn tcp(rule_number: u16, direction: Direction, port: u16, action: RuleAction) -> AclEntryProps {
        AclEntryProps {
            rule_number,
            protocol: 6,
            rule_action: action,
            direction,
            cidr_block: any_ipv4(),
            port_range: Some(PortRange::single(port)),
        }
    }

    fn acl<'a>(stack: &'a Stack, acl: &NetworkAclRef) -> &'a NetworkAcl {
        stack.network_acls().iter().find(|a| a.id == acl.id).unwrap()
    }

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn same_rule_number_in_both_directions() {
        let (mut stack, _, acl_ref) = setup();
        AclEntry::declare(
            &mut stack,
            "InboundHttp",
            &acl_ref,
            tcp(100, Direction::Ingress, 80, RuleAction::Allow),
        )
        .unwrap();
        AclEntry::declare(
            &mut stack,
            "OutboundHttps",
            &acl_ref,
            tcp(100, Direction::Egress, 443, RuleAction::Allow),
        )
        .unwrap();

        assert_eq!(acl(&stack, &acl_ref).entries.len(), 2);
    }

    #[test]
    fn duplicate_rule_number_in_one_direction_is_rejected() {
        let (mut stack, _, acl_ref) = setup();
        AclEntry::declare(
            &mut stack,
            "InboundHttp",
            &acl_ref,
            tcp(100, Direction::Ingress, 80, RuleAction::Allow),
        )
        .unwrap();
        let result = AclEntry::declare(
            &mut stack,
            "InboundHttps",
            &acl_ref,
            tcp(100, Direction::Ingress, 443, RuleAction::Allow),
        );

        assert_eq!(
            result,
            Err(StackError::DuplicateAclRule {
                acl: "Acl".to_string(),
                direction: Direction::Ingress,
                rule_number: 100,
            })
        );
        // The rejected entry does not claim its id
        assert!(
            AclEntry::declare(
                &mut stack,
                "InboundHttps",
                &acl_ref,
                tcp(110, Direction::Ingress, 443, RuleAction::Allow),
            )
            .is_ok()
        );
    }

    #[test]
    fn lowest_rule_number_wins() {
        let (mut stack, _, acl_ref) = setup();
        AclEntry::declare(
            &mut stack,
            "AllowHttp",
            &acl_ref,
            tcp(200, Direction::Ingress, 80, RuleAction::Allow),
        )
        .unwrap();
        AclEntry::declare(
            &mut stack,
            "DenyHttp",
            &acl_ref,
            tcp(100, Direction::Ingress, 80, RuleAction::Deny),
        )
        .unwrap();

        let acl = acl(&stack, &acl_ref);
        assert_eq!(
            acl.evaluate(Direction::Ingress, 6, Some(80), addr("203.0.113.7")),
            RuleAction::Deny
        );
        let order: Vec<_> = acl
            .entries_for(Direction::Ingress)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(order, vec!["DenyHttp", "AllowHttp"]);
    }

    #[test]
    fn unmatched_traffic_is_denied() {
        let (mut stack, _, acl_ref) = setup();
        AclEntry::declare(
            &mut stack,
            "InboundHttp",
            &acl_ref,
            tcp(100, Direction::Ingress, 80, RuleAction::Allow),
        )
        .unwrap();

        let acl = acl(&stack, &acl_ref);
        assert_eq!(
            acl.evaluate(Direction::Ingress, 6, Some(80), addr("198.51.100.1")),
            RuleAction::Allow
        );
        assert_eq!(
            acl.evaluate(Direction::Ingress, 6, Some(22), addr("198.51.100.1")),
            RuleAction::Deny
        );
        assert_eq!(
            acl.evaluate(Direction::Egress, 6, Some(80), addr("198.51.100.1")),
            RuleAction::Deny
        );
        assert_eq!(
            acl.evaluate(Direction::Ingress, 17, Some(80), addr("198.51.100.1")),
            RuleAction::Deny
        );
    }

    #[test]
    fn entry_validation() {
        let (mut stack, _, acl_ref) = setup();

        let mut props = tcp(0, Direction::Ingress, 80, RuleAction::Allow);
        assert!(matches!(
            AclEntry::declare(&mut stack, "Zero", &acl_ref, props.clone()),
            Err(StackError::InvalidRuleNumber { .. })
        ));

        props.rule_number = 100;
        props.protocol = 300;
        assert!(matches!(
            AclEntry::declare(&mut stack, "BadProtocol", &acl_ref, props.clone()),
            Err(StackError::InvalidProtocol { .. })
        ));

        props.protocol = 6;
        props.port_range = None;
        assert!(matches!(
            AclEntry::declare(&mut stack, "NoPorts", &acl_ref, props.clone()),
            Err(StackError::MissingPortRange { .. })
        ));

        props.port_range = Some(PortRange::new(443, 80));
        assert!(matches!(
            AclEntry::declare(&mut stack, "Inverted", &acl_ref, props.clone()),
            Err(StackError::InvalidPortRange { .. })
        ));

        props.protocol = -1;
        props.port_range = None;
        assert!(AclEntry::declare(&mut stack, "AllTraffic", &acl_ref, props).is_ok());
    }

    #[test]
    fn subnet_takes_one_custom_acl() {
        let (mut stack, network, acl_ref) = setup();
        let other = NetworkAcl::declare(&mut stack, "OtherAcl", &network).unwrap();
        let subnet = &network.private_subnets()[0];

        SubnetAclAssociation::declare(&mut stack, "Assoc0", &acl_ref, subnet).unwrap();
        let result = SubnetAclAssociation::declare(&mut stack, "Assoc1", &other, subnet);

        assert_eq!(
            result,
            Err(StackError::SubnetAlreadyAssociated {
                subnet: subnet.logical_id(),
                acl: "Acl".to_string(),
            })
        );
    }

    #[test]
    fn subnet_of_another_network_is_rejected() {
        let (mut stack, _, acl_ref) = setup();
        let other = Network::declare(
            &mut stack,
            "OtherVpc",
            NetworkProps {
                cidr: "10.1.0.0/16".parse().unwrap(),
                max_azs: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let result =
            SubnetAclAssociation::declare(&mut stack, "Assoc", &acl_ref, &other.private_subnets()[0]);
        assert!(matches!(result, Err(StackError::ForeignSubnet { .. })));
    }

    #[test]
    fn entry_resource_carries_port_range() {
        let entry = AclEntry {
            id: "InboundHttp".to_string(),
            props: tcp(100, Direction::Ingress, 80, RuleAction::Allow),
        };
        let resource = entry.resource("Acl");

        assert_eq!(resource.attribute("egress"), Some(&Value::Bool(false)));
        assert_eq!(resource.attribute("protocol"), Some(&Value::Int(6)));
        assert_eq!(
            resource.attribute("port_range"),
            Some(&Value::map([("from", Value::Int(80)), ("to", Value::Int(80))]))
        );
        assert_eq!(resource.references().into_iter().collect::<Vec<_>>(), vec!["Acl"]);
    }
}
