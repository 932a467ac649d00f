//! Configuration for the network stack blueprint
//!
//! Every field is optional in the JSON document; missing fields fall back to
//! the reference topology.

use std::path::{Path, PathBuf};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::topology::SubnetConfiguration;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for this schema
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkStackConfig {
    pub stack_name: String,
    pub description: Option<String>,
    /// Leave unset for a region-agnostic stack
    pub region: Option<String>,
    pub availability_zones: Vec<String>,
    pub network: NetworkConfig,
    pub security_group: SecurityGroupConfig,
    pub network_acl: NetworkAclConfig,
}

impl Default for NetworkStackConfig {
    fn default() -> Self {
        Self {
            stack_name: "NetworkStack".to_string(),
            description: None,
            region: None,
            availability_zones: Vec::new(),
            network: NetworkConfig::default(),
            security_group: SecurityGroupConfig::default(),
            network_acl: NetworkAclConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub id: String,
    pub cidr: String,
    pub max_azs: usize,
    pub nat_gateways: usize,
    pub public_subnet: SubnetGroupConfig,
    pub private_subnet: SubnetGroupConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            id: "CustomVPC".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: 2,
            public_subnet: SubnetGroupConfig::default(),
            private_subnet: SubnetGroupConfig::default(),
        }
    }
}

impl NetworkConfig {
    pub const PUBLIC_SUBNET_NAME: &'static str = "public-subnet";
    pub const PRIVATE_SUBNET_NAME: &'static str = "private-subnet";

    pub fn public_subnet_name(&self) -> &str {
        self.public_subnet
            .name
            .as_deref()
            .unwrap_or(Self::PUBLIC_SUBNET_NAME)
    }

    pub fn private_subnet_name(&self) -> &str {
        self.private_subnet
            .name
            .as_deref()
            .unwrap_or(Self::PRIVATE_SUBNET_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubnetGroupConfig {
    /// Unset keeps the reference name of the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cidr_mask: u8,
}

impl Default for SubnetGroupConfig {
    fn default() -> Self {
        Self {
            name: None,
            cidr_mask: SubnetConfiguration::DEFAULT_CIDR_MASK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityGroupConfig {
    pub id: String,
    pub description: String,
    pub allow_all_outbound: bool,
}

impl Default for SecurityGroupConfig {
    fn default() -> Self {
        Self {
            id: "InstanceSecurityGroup".to_string(),
            description: "Security Group for EC2 in private subnet".to_string(),
            allow_all_outbound: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkAclConfig {
    pub id: String,
}

impl Default for NetworkAclConfig {
    fn default() -> Self {
        Self {
            id: "CustomNACL".to_string(),
        }
    }
}

/// Values given on the command line, applied on top of a loaded config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_azs: Option<usize>,
    pub nat_gateways: Option<usize>,
    /// Applied to both subnet groups
    pub cidr_mask: Option<u8>,
}

impl NetworkStackConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.network_cidr()?;
        Ok(config)
    }

    pub fn network_cidr(&self) -> Result<Ipv4Network, ConfigError> {
        self.network
            .cidr
            .parse()
            .map_err(|e: ipnetwork::IpNetworkError| ConfigError::InvalidCidr {
                value: self.network.cidr.clone(),
                reason: e.to_string(),
            })
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(max_azs) = overrides.max_azs {
            self.network.max_azs = max_azs;
        }
        if let Some(nat_gateways) = overrides.nat_gateways {
            self.network.nat_gateways = nat_gateways;
        }
        if let Some(mask) = overrides.cidr_mask {
            self.network.public_subnet.cidr_mask = mask;
            self.network.private_subnet.cidr_mask = mask;
        }
    }
}
