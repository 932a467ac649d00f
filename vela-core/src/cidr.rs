//! Address planning for subnet groups
//!
//! Subnets are carved out of the network block sequentially: group by group,
//! availability zone by availability zone, each aligned to its own mask.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// Longest prefix the provider accepts for a subnet
pub const MAX_SUBNET_PREFIX: u8 = 28;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("subnet mask /{mask} does not fit {network}: must be between /{} and /{}", network.prefix(), MAX_SUBNET_PREFIX)]
    InvalidMask { mask: u8, network: Ipv4Network },

    #[error("address space of {network} exhausted while allocating a /{mask} subnet")]
    Exhausted { mask: u8, network: Ipv4Network },
}

/// Sequential allocator of subnet ranges within a network block
#[derive(Debug, Clone)]
pub struct AddressPlanner {
    network: Ipv4Network,
    /// Offset (in addresses) of the first unallocated address
    next: u64,
}

impl AddressPlanner {
    pub fn new(network: Ipv4Network) -> Self {
        Self { network, next: 0 }
    }

    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    /// Allocate the next free range of the given prefix length
    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Network, AddressError> {
        if mask < self.network.prefix() || mask > MAX_SUBNET_PREFIX {
            return Err(AddressError::InvalidMask {
                mask,
                network: self.network,
            });
        }

        let size = 1u64 << (32 - mask);
        let capacity = 1u64 << (32 - self.network.prefix());
        let start = self.next.div_ceil(size) * size;
        let end = start + size;
        if end > capacity {
            return Err(AddressError::Exhausted {
                mask,
                network: self.network,
            });
        }

        let base = u64::from(u32::from(self.network.network())) + start;
        let subnet = Ipv4Network::new(Ipv4Addr::from(base as u32), mask).map_err(|_| {
            AddressError::InvalidMask {
                mask,
                network: self.network,
            }
        })?;
        self.next = end;
        Ok(subnet)
    }
}

/// The default network block, 10.0.0.0/16
pub fn default_network() -> Ipv4Network {
    Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 16)
        .unwrap_or_else(|_| unreachable!("/16 is a valid IPv4 prefix"))
}

/// The unrestricted IPv4 range, 0.0.0.0/0
pub fn any_ipv4() -> Ipv4Network {
    Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0)
        .unwrap_or_else(|_| unreachable!("/0 is a valid IPv4 prefix"))
}
