//! Network fence.
//!
//! The fence is what the container lifecycle talks to. It turns a network
//! spec into an [`Allocation`] when a container is created, turns a persisted
//! record back into one after a restart, and otherwise holds nothing but the
//! shared pool and the interface MTU.
//!
//! ## Network specs
//!
//! - `""`: any free subnet, any free address in it
//! - `"10.0.0.0/30"`: exactly this subnet, any free address in it
//! - `"10.0.0.2/30"`: exactly this subnet and exactly this address
//! - `"10.0.0.0"`: a bare address takes the pool's default prefix length,
//!   so with /30 subnets this is the same as `"10.0.0.0/30"`
//!
//! ## Example
//!
//! ```
//! use netfence::fence::Fence;
//! use netfence::ip::{AddressRange, SubnetPool};
//! use std::sync::Arc;
//!
//! let range = AddressRange::new("10.254.0.0/22".parse()?, 30)?;
//! let fence = Fence::new(Arc::new(SubnetPool::new(range)), 1500);
//!
//! let allocation = fence.build("")?;
//! assert_eq!(allocation.subnet().to_string(), "10.254.0.0/30");
//!
//! let record = allocation.serialize()?;
//! allocation.dismantle()?;
//!
//! // The record restores the same reservation in a fresh process
//! let restored = fence.rebuild(&record)?;
//! assert_eq!(restored.container_ip().to_string(), "10.254.0.2");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocation;
pub mod recovery;

pub use allocation::{Allocation, ContainerInfo, FlatFence};
pub use recovery::RecoveryReport;

use crate::config::NetworkConfig;
use crate::ip::{address, AddressRange, FenceError, IpSelector, SubnetPool, SubnetSelector};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Builds, rebuilds and hands out container network allocations
#[derive(Debug, Clone)]
pub struct Fence {
    pool: Arc<SubnetPool>,
    mtu: u32,
}

impl Fence {
    pub fn new(pool: Arc<SubnetPool>, mtu: u32) -> Self {
        Fence { pool, mtu }
    }

    /// Create a fence with a fresh pool for the configured range
    pub fn from_config(config: &NetworkConfig) -> Result<Self, FenceError> {
        let range = AddressRange::new(config.pool, config.subnet_prefix)?;
        Ok(Fence::new(Arc::new(SubnetPool::new(range)), config.mtu))
    }

    pub fn pool(&self) -> &SubnetPool {
        &self.pool
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    /// Number of containers the pool can network with default-sized subnets
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Allocate a subnet and container address for `spec`.
    ///
    /// An empty spec is fully dynamic. Otherwise the spec names a subnet, which
    /// is reserved exactly; if its address part is the subnet's network
    /// address the container address is chosen dynamically, and if not that
    /// exact address is reserved.
    pub fn build(&self, spec: &str) -> Result<Allocation, FenceError> {
        let (subnet_selector, ip_selector) = if spec.is_empty() {
            (SubnetSelector::Dynamic, IpSelector::Dynamic)
        } else {
            let requested = address::parse_spec(spec, self.pool.range().subnet_prefix())?;
            let subnet = requested.trunc();

            let ip_selector = if requested.addr() == address::network_address(&subnet) {
                IpSelector::Dynamic
            } else {
                IpSelector::Static(requested.addr())
            };
            (SubnetSelector::Static(subnet), ip_selector)
        };

        let (subnet, container_ip) = self.pool.allocate(subnet_selector, ip_selector)?;
        Ok(self.allocation(subnet, container_ip))
    }

    /// Restore an allocation from the bytes produced by [`Allocation::serialize`].
    ///
    /// Fails if the record cannot be decoded or if its subnet or address is no
    /// longer available in the pool.
    pub fn rebuild(&self, state: &[u8]) -> Result<Allocation, FenceError> {
        let flat: FlatFence = serde_json::from_slice(state)
            .map_err(|e| FenceError::MalformedState(e.to_string()))?;

        let subnet = flat
            .ipn
            .parse::<Ipv4Net>()
            .map_err(|e| FenceError::MalformedState(format!("invalid subnet '{}': {}", flat.ipn, e)))?
            .trunc();
        let container_ip = flat
            .container_ip
            .parse::<Ipv4Addr>()
            .map_err(|e| FenceError::MalformedState(format!("invalid container IP '{}': {}", flat.container_ip, e)))?;

        self.pool.recover(subnet, container_ip)?;
        Ok(self.allocation(subnet, container_ip))
    }

    fn allocation(&self, subnet: Ipv4Net, container_ip: Ipv4Addr) -> Allocation {
        Allocation::new(subnet, container_ip, self.mtu, Arc::clone(&self.pool))
    }
}
