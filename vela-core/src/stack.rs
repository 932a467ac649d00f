//! Stack - Explicit deployment-unit context
//!
//! Every construct is declared against a [`Stack`]. Synthesis expands the
//! declared constructs into resources, orders them by dependency and returns
//! a [`DeploymentUnit`] ready to be rendered for a provisioning engine.

use std::collections::HashSet;
use std::fmt;

use crate::cidr::AddressError;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::graph::{Dependency, DependencyGraph, GraphError};
use crate::resource::{Resource, Value};
use crate::topology::{
    AvailabilityZone, Direction, Network, NetworkAcl, Output, SecurityGroup, SubnetAclAssociation,
};

/// Availability zones selected for a region-agnostic stack
pub const AGNOSTIC_ZONE_LIMIT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("invalid id '{0}': ids must be 1-255 ASCII letters or digits")]
    InvalidId(String),

    #[error("id '{0}' is already declared in this stack")]
    DuplicateId(String),

    #[error("invalid network '{network}': {reason}")]
    InvalidNetwork { network: String, reason: String },

    #[error("address planning failed for network '{network}'")]
    Address {
        network: String,
        #[source]
        source: AddressError,
    },

    #[error("unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    #[error("network ACL '{acl}' already has {direction} rule #{rule_number}")]
    DuplicateAclRule {
        acl: String,
        direction: Direction,
        rule_number: u16,
    },

    #[error("entry '{entry}': rule number {rule_number} is outside 1..=32766")]
    InvalidRuleNumber { entry: String, rule_number: u16 },

    #[error("entry '{entry}': protocol number {protocol} is outside -1..=255")]
    InvalidProtocol { entry: String, protocol: i16 },

    #[error("entry '{entry}': protocol {protocol} requires a port range")]
    MissingPortRange { entry: String, protocol: i16 },

    #[error("'{subject}': invalid port range {from}-{to}")]
    InvalidPortRange { subject: String, from: i32, to: i32 },

    #[error("subnet '{subnet}' is already associated with network ACL '{acl}'")]
    SubnetAlreadyAssociated { subnet: String, acl: String },

    #[error(
        "subnet '{subnet}' belongs to network '{subnet_network}' but network ACL '{acl}' belongs to '{acl_network}'"
    )]
    ForeignSubnet {
        subnet: String,
        subnet_network: String,
        acl: String,
        acl_network: String,
    },

    #[error("output '{0}' is already declared")]
    DuplicateOutput(String),

    #[error("output '{output}' must be a string or a resource reference")]
    InvalidOutputValue { output: String },

    #[error("logical id '{0}' is produced more than once")]
    DuplicateLogicalId(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Target account/region of a stack
///
/// Without a region the stack is region-agnostic and availability zones are
/// selected by index at deployment time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub region: Option<String>,
    pub availability_zones: Vec<String>,
}

impl Environment {
    pub fn agnostic() -> Self {
        Self::default()
    }

    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            availability_zones: Vec::new(),
        }
    }

    pub fn with_availability_zones(mut self, zones: Vec<String>) -> Self {
        self.availability_zones = zones;
        self
    }

    pub fn is_agnostic(&self) -> bool {
        self.region.is_none()
    }

    /// Pick up to `max` zones
    ///
    /// Named zones are used in the order given. Otherwise at most
    /// [`AGNOSTIC_ZONE_LIMIT`] zones are picked by index.
    pub fn select_zones(&self, max: usize) -> Vec<AvailabilityZone> {
        if !self.availability_zones.is_empty() {
            return self
                .availability_zones
                .iter()
                .take(max)
                .cloned()
                .map(AvailabilityZone::Named)
                .collect();
        }
        (0..max.min(AGNOSTIC_ZONE_LIMIT))
            .map(AvailabilityZone::Indexed)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    environment: Environment,
    ids: HashSet<String>,
    pub(crate) networks: Vec<Network>,
    pub(crate) security_groups: Vec<SecurityGroup>,
    pub(crate) acls: Vec<NetworkAcl>,
    pub(crate) associations: Vec<SubnetAclAssociation>,
    pub(crate) outputs: Vec<Output>,
    diagnostics: Vec<Diagnostic>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            environment: Environment::agnostic(),
            ids: HashSet::new(),
            networks: Vec::new(),
            security_groups: Vec::new(),
            acls: Vec::new(),
            associations: Vec::new(),
            outputs: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Diagnostics reported so far, in the order they were raised
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn security_groups(&self) -> &[SecurityGroup] {
        &self.security_groups
    }

    pub fn network_acls(&self) -> &[NetworkAcl] {
        &self.acls
    }

    pub fn associations(&self) -> &[SubnetAclAssociation] {
        &self.associations
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Reserve a construct id
    pub(crate) fn claim_id(&mut self, id: &str) -> Result<(), StackError> {
        if id.is_empty() || id.len() > 255 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StackError::InvalidId(id.to_string()));
        }
        if !self.ids.insert(id.to_string()) {
            return Err(StackError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn require_network(&self, id: &str) -> Result<&Network, StackError> {
        self.networks
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| StackError::UnknownReference {
                kind: "network",
                id: id.to_string(),
            })
    }

    pub(crate) fn network_acl(&self, id: &str) -> Result<&NetworkAcl, StackError> {
        self.acls
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| unknown_acl(id))
    }

    pub(crate) fn network_acl_mut(&mut self, id: &str) -> Result<&mut NetworkAcl, StackError> {
        self.acls
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| unknown_acl(id))
    }

    /// Expand every construct into resources, in declaration order
    fn expand(&self) -> Vec<Resource> {
        let mut resources = Vec::new();
        for network in &self.networks {
            resources.extend(network.resources(&self.name));
        }
        for sg in &self.security_groups {
            resources.push(sg.resource(&self.name));
        }
        for acl in &self.acls {
            resources.extend(acl.resources(&self.name));
        }
        for association in &self.associations {
            resources.push(association.resource());
        }
        resources
    }

    /// Produce the deployment unit: ordered resources plus outputs
    pub fn synthesize(&self) -> Result<DeploymentUnit, StackError> {
        let resources = self.expand();

        let mut graph = DependencyGraph::new();
        for resource in &resources {
            if !graph.add_node(resource.logical_id()) {
                return Err(StackError::DuplicateLogicalId(
                    resource.logical_id().to_string(),
                ));
            }
        }
        for resource in &resources {
            for (target, attribute) in resource.referenced_attributes() {
                graph.add_edge(resource.logical_id(), Dependency::reference(target, attribute));
            }
            for target in &resource.depends_on {
                graph.add_edge(resource.logical_id(), Dependency::ordering(target));
            }
        }
        graph.check_targets()?;

        for output in &self.outputs {
            if let Value::ResourceRef(target, _) = &output.value
                && !graph.contains(target)
            {
                return Err(StackError::UnknownReference {
                    kind: "resource",
                    id: target.clone(),
                });
            }
        }

        let order = graph.topological_order()?;
        let mut pending: Vec<Option<Resource>> = resources.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(pending.len());
        for logical_id in &order {
            if let Some(slot) = pending
                .iter_mut()
                .find(|r| r.as_ref().is_some_and(|r| r.logical_id() == logical_id))
                && let Some(resource) = slot.take()
            {
                ordered.push(resource);
            }
        }

        let mut diagnostics = self.diagnostics.clone();
        for sg in &self.security_groups {
            if sg.blocks_all_egress() {
                let diagnostic = Diagnostic::warning(DiagnosticKind::EgressBlocked {
                    security_group: sg.id.clone(),
                });
                diagnostic.log();
                diagnostics.push(diagnostic);
            }
        }

        log::debug!(
            "synthesized stack {} into {} resources and {} outputs",
            self.name,
            ordered.len(),
            self.outputs.len()
        );

        Ok(DeploymentUnit {
            name: self.name.clone(),
            description: self.description.clone(),
            resources: ordered,
            outputs: self.outputs.clone(),
            diagnostics,
            graph,
        })
    }
}

fn unknown_acl(id: &str) -> StackError {
    StackError::UnknownReference {
        kind: "network ACL",
        id: id.to_string(),
    }
}

/// Desired-state snapshot submitted as a single unit
#[derive(Debug, Clone)]
pub struct DeploymentUnit {
    pub name: String,
    pub description: Option<String>,
    /// Resources in dependency order
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
    pub diagnostics: Vec<Diagnostic>,
    pub graph: DependencyGraph,
}

impl DeploymentUnit {
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id() == logical_id)
    }

    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .iter()
            .filter(move |r| r.resource_type() == resource_type)
    }

    pub fn count(&self, resource_type: &str) -> usize {
        self.of_type(resource_type).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    pub fn summary(&self) -> UnitSummary {
        let mut by_type: Vec<(String, usize)> = Vec::new();
        for resource in &self.resources {
            match by_type.iter_mut().find(|(t, _)| t == resource.resource_type()) {
                Some((_, n)) => *n += 1,
                None => by_type.push((resource.resource_type().to_string(), 1)),
            }
        }
        UnitSummary {
            resources: self.resources.len(),
            outputs: self.outputs.len(),
            warnings: self.warnings().count(),
            by_type,
        }
    }
}

/// Resource counts of a deployment unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSummary {
    pub resources: usize,
    pub outputs: usize,
    pub warnings: usize,
    /// Counts per resource type, in order of first appearance
    pub by_type: Vec<(String, usize)>,
}

impl fmt::Display for UnitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resources, {} outputs, {} warnings",
            self.resources, self.outputs, self.warnings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cidr::any_ipv4;
    use crate::topology::{
        AclEntry, AclEntryProps, NetworkProps, Peer, Port, PortRange, RuleAction,
        SecurityGroupProps, SubnetConfiguration, kind,
    };

    fn position(unit: &DeploymentUnit, logical_id: &str) -> usize {
        unit.resources
            .iter()
            .position(|r| r.logical_id() == logical_id)
            .unwrap()
    }

    fn small_stack() -> Stack {
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
        let sg = SecurityGroup::declare(
            &mut stack,
            "Sg",
            &network,
            SecurityGroupProps::default(),
        )
        .unwrap();
        stack
            .add_egress_rule(&sg, Peer::any_ipv4(), Port::tcp(443), "Allow HTTPS Out")
            .unwrap();
        stack
    }

    #[test]
    fn claim_id_rejects_duplicates_and_bad_names() {
        let mut stack = Stack::new("Test");
        stack.claim_id("Vpc").unwrap();
        assert_eq!(
            stack.claim_id("Vpc"),
            Err(StackError::DuplicateId("Vpc".to_string()))
        );
        assert_eq!(stack.claim_id(""), Err(StackError::InvalidId(String::new())));
        assert_eq!(
            stack.claim_id("my-vpc"),
            Err(StackError::InvalidId("my-vpc".to_string()))
        );
    }

    #[test]
    fn agnostic_environment_selects_two_zones() {
        let env = Environment::agnostic();
        assert!(env.is_agnostic());
        assert_eq!(
            env.select_zones(3),
            vec![AvailabilityZone::Indexed(0), AvailabilityZone::Indexed(1)]
        );
        assert_eq!(env.select_zones(1), vec![AvailabilityZone::Indexed(0)]);
    }

    #[test]
    fn resources_follow_their_dependencies() {
        let unit = small_stack().synthesize().unwrap();

        for resource in &unit.resources {
            let at = position(&unit, resource.logical_id());
            for dep in resource.dependencies() {
                assert!(
                    position(&unit, &dep) < at,
                    "{} must come after {}",
                    resource.logical_id(),
                    dep
                );
            }
        }
        assert_eq!(unit.resources[0].logical_id(), "Vpc");
    }

    #[test]
    fn nat_gateway_waits_for_public_route() {
        let unit = small_stack().synthesize().unwrap();
        assert!(
            position(&unit, "VpcPublic1DefaultRoute") < position(&unit, "VpcPublic1NATGateway")
        );
        assert!(position(&unit, "VpcVPCGW") < position(&unit, "VpcPublic1DefaultRoute"));
    }

    #[test]
    fn blocked_egress_is_a_warning() {
        let mut stack = Stack::new("Test");
        let network = Network::declare(&mut stack, "Vpc", NetworkProps::default()).unwrap();
        SecurityGroup::declare(&mut stack, "Sg", &network, SecurityGroupProps::default()).unwrap();

        let unit = stack.synthesize().unwrap();
        assert!(unit.warnings().any(|d| matches!(
            &d.kind,
            DiagnosticKind::EgressBlocked { security_group } if security_group == "Sg"
        )));
    }

    #[test]
    fn egress_rule_clears_blocked_warning() {
        let unit = small_stack().synthesize().unwrap();
        assert_eq!(unit.warnings().count(), 0);
    }

    #[test]
    fn output_must_reference_a_resource() {
        let mut stack = small_stack();
        Output::declare(&mut stack, "Missing", Value::id_of("Nowhere")).unwrap();
        assert_eq!(
            stack.synthesize().unwrap_err(),
            StackError::UnknownReference {
                kind: "resource",
                id: "Nowhere".to_string(),
            }
        );
    }

    #[test]
    fn declaring_against_unknown_network_fails() {
        let mut stack = Stack::new("Test");
        let mut other = Stack::new("Other");
        let network = Network::declare(&mut other, "Vpc", NetworkProps::default()).unwrap();

        let result = SecurityGroup::declare(&mut stack, "Sg", &network, SecurityGroupProps::default());
        assert_eq!(
            result.unwrap_err(),
            StackError::UnknownReference {
                kind: "network",
                id: "Vpc".to_string(),
            }
        );
    }

    #[test]
    fn narrower_masks_change_only_subnet_ranges() {
        let build = |mask: u8| {
            let mut stack = Stack::new("Test");
            let network = Network::declare(
                &mut stack,
                "Vpc",
                NetworkProps {
                    max_azs: 2,
                    subnet_configuration: vec![
                        SubnetConfiguration::public("public").with_cidr_mask(mask),
                        SubnetConfiguration::private_with_egress("private").with_cidr_mask(mask),
                    ],
                    ..Default::default()
                },
            )
            .unwrap();
            let acl = NetworkAcl::declare(&mut stack, "Acl", &network).unwrap();
            AclEntry::declare(
                &mut stack,
                "InboundHttp",
                &acl,
                AclEntryProps {
                    rule_number: 100,
                    protocol: 6,
                    rule_action: RuleAction::Allow,
                    direction: Direction::Ingress,
                    cidr_block: any_ipv4(),
                    port_range: Some(PortRange::single(80)),
                },
            )
            .unwrap();
            stack.synthesize().unwrap()
        };

        let wide = build(24);
        let narrow = build(25);
        assert_eq!(wide.resources.len(), narrow.resources.len());
        for (a, b) in wide.resources.iter().zip(&narrow.resources) {
            assert_eq!(a.id, b.id);
            if a.resource_type() == kind::SUBNET {
                assert_ne!(a.attribute("cidr_block"), b.attribute("cidr_block"));
                let mut a = a.clone();
                let mut b = b.clone();
                a.attributes.remove("cidr_block");
                b.attributes.remove("cidr_block");
                assert_eq!(a, b);
            } else {
                assert_eq!(a, b);
            }
        }
        assert_eq!(
            narrow.get("VpcPrivate2Subnet").unwrap().attribute("cidr_block"),
            Some(&Value::string("10.0.1.128/25"))
        );
    }

    #[test]
    fn summary_counts_types() {
        let unit = small_stack().synthesize().unwrap();
        let summary = unit.summary();
        assert_eq!(summary.resources, unit.resources.len());
        assert!(summary
            .by_type
            .contains(&(kind::NAT_GATEWAY.to_string(), 2)));
        assert_eq!(summary.to_string(), format!("{} resources, 0 outputs, 0 warnings", unit.resources.len()));
    }
}
