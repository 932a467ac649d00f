//! Configuration-time diagnostics
//!
//! Problems that leave the declaration valid but degrade it, such as a NAT
//! gateway shortfall, are reported as diagnostics instead of errors.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Notice,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Notice => write!(f, "notice"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error(
        "network '{network}' has {nat_gateways} NAT gateway(s) for {availability_zones} availability zones with private subnets; private subnets in the remaining zones route egress through another zone"
    )]
    NatCoverageGap {
        network: String,
        nat_gateways: usize,
        availability_zones: usize,
    },

    #[error(
        "network '{network}' requests {requested} NAT gateway(s) but only {placed} can be placed"
    )]
    ExcessNatGateways {
        network: String,
        requested: usize,
        placed: usize,
    },

    #[error(
        "network '{network}' requests {requested} availability zones but only {available} are available"
    )]
    ZonesLimited {
        network: String,
        requested: usize,
        available: usize,
    },

    #[error(
        "security group '{security_group}' denies outbound traffic by default and declares no egress rules; all outbound traffic is blocked"
    )]
    EgressBlocked { security_group: String },

    #[error(
        "security group '{security_group}' allows all outbound traffic; egress rule '{description}' is ignored"
    )]
    EgressRuleIgnored {
        security_group: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
        }
    }

    pub fn notice(kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Notice,
            kind,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Emit through the `log` facade at a level matching the severity
    pub(crate) fn log(&self) {
        match self.severity {
            Severity::Warning => log::warn!("{}", self.kind),
            Severity::Notice => log::info!("{}", self.kind),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.kind)
    }
}
