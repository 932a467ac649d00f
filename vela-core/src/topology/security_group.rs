//! Security group - Stateful instance-level firewall
//!
//! Outbound traffic is denied unless explicitly allowed: a group declared with
//! `allow_all_outbound = false` and no egress rules blocks every connection
//! it would otherwise originate.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::cidr;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::resource::{Resource, Value};
use crate::stack::{Stack, StackError};
use crate::topology::{Direction, NetworkRef, kind, name_tag};

/// IP protocol of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

impl Protocol {
    /// IANA protocol number, -1 for all protocols
    pub fn number(&self) -> i16 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
            Protocol::All => -1,
        }
    }

    pub fn from_number(number: i16) -> Option<Self> {
        match number {
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            1 => Some(Protocol::Icmp),
            -1 => Some(Protocol::All),
            _ => None,
        }
    }

    /// Protocol name as the provider expects it
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "-1",
        }
    }
}

/// Protocol plus port range (ICMP type/code for ICMP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub protocol: Protocol,
    pub from: i32,
    pub to: i32,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self::tcp_range(port, port)
    }

    pub fn tcp_range(from: u16, to: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: i32::from(from),
            to: i32::from(to),
        }
    }

    pub fn all_tcp() -> Self {
        Self::tcp_range(0, 65535)
    }

    pub fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            from: i32::from(port),
            to: i32::from(port),
        }
    }

    pub fn icmp_type_and_code(icmp_type: i32, code: i32) -> Self {
        Self {
            protocol: Protocol::Icmp,
            from: icmp_type,
            to: code,
        }
    }

    pub fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from: -1,
            to: -1,
        }
    }

    /// Whether traffic with this protocol and port is covered
    pub fn matches(&self, protocol: Protocol, port: Option<u16>) -> bool {
        match self.protocol {
            Protocol::All => true,
            Protocol::Icmp => protocol == Protocol::Icmp,
            p if p == protocol => {
                port.is_some_and(|n| (self.from..=self.to).contains(&i32::from(n)))
            }
            _ => false,
        }
    }

    fn is_valid(&self) -> bool {
        match self.protocol {
            Protocol::Tcp | Protocol::Udp => {
                (0..=65535).contains(&self.from) && (0..=65535).contains(&self.to) && self.from <= self.to
            }
            Protocol::Icmp | Protocol::All => true,
        }
    }
}

/// Traffic source (ingress) or destination (egress)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peer {
    Ipv4(Ipv4Network),
    /// Another security group, by construct id
    SecurityGroup(String),
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Peer::Ipv4(cidr::any_ipv4())
    }

    pub fn ipv4(network: Ipv4Network) -> Self {
        Peer::Ipv4(network)
    }

    pub fn security_group(group: &SecurityGroupRef) -> Self {
        Peer::SecurityGroup(group.id.clone())
    }

    /// Whether `addr` falls within this peer; group peers never match an address
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        match self {
            Peer::Ipv4(network) => network.contains(addr),
            Peer::SecurityGroup(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

impl Rule {
    fn to_value(&self, direction: Direction) -> Value {
        let mut entries = vec![
            ("ip_protocol", Value::string(self.port.protocol.name())),
            ("description", Value::String(self.description.clone())),
        ];
        if self.port.protocol != Protocol::All {
            entries.push(("from_port", Value::Int(i64::from(self.port.from))));
            entries.push(("to_port", Value::Int(i64::from(self.port.to))));
        }
        match (&self.peer, direction) {
            (Peer::Ipv4(network), _) => {
                entries.push(("cidr_ip", Value::String(network.to_string())));
            }
            (Peer::SecurityGroup(group), Direction::Ingress) => {
                entries.push((
                    "source_security_group_id",
                    Value::attribute_of(group, "group_id"),
                ));
            }
            (Peer::SecurityGroup(group), Direction::Egress) => {
                entries.push((
                    "destination_security_group_id",
                    Value::attribute_of(group, "group_id"),
                ));
            }
        }
        Value::map(entries)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityGroupProps {
    pub description: String,
    /// Outbound is denied unless this is set
    pub allow_all_outbound: bool,
}

/// Handle to a declared security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRef {
    pub id: String,
}

impl SecurityGroupRef {
    pub fn group_id(&self) -> Value {
        Value::attribute_of(&self.id, "group_id")
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub id: String,
    pub network: String,
    pub props: SecurityGroupProps,
    pub ingress: Vec<Rule>,
    pub egress: Vec<Rule>,
}

impl SecurityGroup {
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        network: &NetworkRef,
        props: SecurityGroupProps,
    ) -> Result<SecurityGroupRef, StackError> {
        stack.require_network(&network.id)?;
        stack.claim_id(id)?;

        log::debug!(
            "declared security group {} in {} (allow_all_outbound: {})",
            id,
            network.id,
            props.allow_all_outbound
        );

        stack.security_groups.push(SecurityGroup {
            id: id.to_string(),
            network: network.id.clone(),
            props,
            ingress: Vec::new(),
            egress: Vec::new(),
        });
        Ok(SecurityGroupRef { id: id.to_string() })
    }

    pub fn rules(&self, direction: Direction) -> &[Rule] {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }

    /// Whether traffic in `direction` to or from `addr` is allowed
    pub fn permits(
        &self,
        direction: Direction,
        protocol: Protocol,
        port: Option<u16>,
        addr: Ipv4Addr,
    ) -> bool {
        if direction == Direction::Egress && self.props.allow_all_outbound {
            return true;
        }
        self.rules(direction)
            .iter()
            .any(|rule| rule.peer.contains(addr) && rule.port.matches(protocol, port))
    }

    pub fn permits_ingress(&self, protocol: Protocol, port: Option<u16>, addr: Ipv4Addr) -> bool {
        self.permits(Direction::Ingress, protocol, port, addr)
    }

    pub fn permits_egress(&self, protocol: Protocol, port: Option<u16>, addr: Ipv4Addr) -> bool {
        self.permits(Direction::Egress, protocol, port, addr)
    }

    /// Whether every outbound connection is blocked
    pub fn blocks_all_egress(&self) -> bool {
        !self.props.allow_all_outbound && self.egress.is_empty()
    }

    /// Add a rule unless an identical one exists; returns whether it was added
    fn add_rule(&mut self, direction: Direction, rule: Rule) -> bool {
        let rules = match direction {
            Direction::Ingress => &mut self.ingress,
            Direction::Egress => &mut self.egress,
        };
        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    pub(crate) fn resource(&self, stack_name: &str) -> Resource {
        let ingress = self
            .ingress
            .iter()
            .map(|r| r.to_value(Direction::Ingress))
            .collect();

        let egress = if self.props.allow_all_outbound {
            vec![Value::map([
                ("cidr_ip", Value::string("0.0.0.0/0")),
                (
                    "description",
                    Value::string("Allow all outbound traffic by default"),
                ),
                ("ip_protocol", Value::string("-1")),
            ])]
        } else if self.egress.is_empty() {
            // Replaces the provider's implicit allow-all egress rule with one
            // that matches nothing
            vec![Value::map([
                ("cidr_ip", Value::string("255.255.255.255/32")),
                ("description", Value::string("Disallow all traffic")),
                ("ip_protocol", Value::string("icmp")),
                ("from_port", Value::Int(252)),
                ("to_port", Value::Int(86)),
            ])]
        } else {
            self.egress
                .iter()
                .map(|r| r.to_value(Direction::Egress))
                .collect()
        };

        Resource::new(kind::SECURITY_GROUP, &self.id)
            .with_attribute("group_description", Value::String(self.props.description.clone()))
            .with_attribute("vpc_id", Value::id_of(&self.network))
            .with_attribute("security_group_ingress", Value::List(ingress))
            .with_attribute("security_group_egress", Value::List(egress))
            .with_attribute("tags", name_tag(format!("{}/{}", stack_name, self.id)))
    }
}

impl Stack {
    /// Allow inbound traffic from `peer` on `port`
    ///
    /// Adding a rule identical to an existing one has no effect.
    pub fn add_ingress_rule(
        &mut self,
        group: &SecurityGroupRef,
        peer: Peer,
        port: Port,
        description: impl Into<String>,
    ) -> Result<(), StackError> {
        self.add_security_group_rule(group, Direction::Ingress, peer, port, description.into())
    }

    /// Allow outbound traffic to `peer` on `port`
    ///
    /// Ignored, with a warning, when the group already allows all outbound
    /// traffic.
    pub fn add_egress_rule(
        &mut self,
        group: &SecurityGroupRef,
        peer: Peer,
        port: Port,
        description: impl Into<String>,
    ) -> Result<(), StackError> {
        self.add_security_group_rule(group, Direction::Egress, peer, port, description.into())
    }

    fn add_security_group_rule(
        &mut self,
        group: &SecurityGroupRef,
        direction: Direction,
        peer: Peer,
        port: Port,
        description: String,
    ) -> Result<(), StackError> {
        if !port.is_valid() {
            return Err(StackError::InvalidPortRange {
                subject: group.id.clone(),
                from: port.from,
                to: port.to,
            });
        }
        if let Peer::SecurityGroup(peer_id) = &peer
            && !self.security_groups.iter().any(|sg| &sg.id == peer_id)
        {
            return Err(StackError::UnknownReference {
                kind: "security group",
                id: peer_id.clone(),
            });
        }

        let sg = self
            .security_groups
            .iter_mut()
            .find(|sg| sg.id == group.id)
            .ok_or_else(|| StackError::UnknownReference {
                kind: "security group",
                id: group.id.clone(),
            })?;

        if direction == Direction::Egress && sg.props.allow_all_outbound {
            let diagnostic = Diagnostic::warning(DiagnosticKind::EgressRuleIgnored {
                security_group: group.id.clone(),
                description,
            });
            self.report(diagnostic);
            return Ok(());
        }

        let rule = Rule {
            peer,
            port,
            description,
        };
        if sg.add_rule(direction, rule) {
            log::debug!("added {} rule to security group {}", direction, group.id);
        } else {
            log::debug!(
                "{} rule already present on security group {}",
                direction,
                group.id
            );
        }
        Ok(())
    }
}
