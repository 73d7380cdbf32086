//! A single container's network allocation.

use crate::ip::{address, FenceError, SubnetPool};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Persisted form of an allocation.
///
/// Field names are part of the on-disk format read back by
/// [`Fence::rebuild`](super::Fence::rebuild) after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatFence {
    #[serde(rename = "Ipn")]
    pub ipn: String,
    #[serde(rename = "ContainerIP")]
    pub container_ip: String,
}

/// Network fields exported to container inspection tooling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub host_ip: String,
    pub container_ip: String,
}

/// One subnet and one container address inside it, reserved in a pool.
///
/// Dropping an allocation keeps the reservation; only [`Allocation::dismantle`]
/// gives it back.
pub struct Allocation {
    subnet: Ipv4Net,
    container_ip: Ipv4Addr,
    mtu: u32,
    pool: Arc<SubnetPool>,
}

impl Allocation {
    pub(crate) fn new(subnet: Ipv4Net, container_ip: Ipv4Addr, mtu: u32, pool: Arc<SubnetPool>) -> Self {
        Allocation {
            subnet,
            container_ip,
            mtu,
            pool,
        }
    }

    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    pub fn container_ip(&self) -> Ipv4Addr {
        self.container_ip
    }

    /// Host side of the container's link: the subnet's gateway address
    pub fn host_ip(&self) -> Ipv4Addr {
        address::gateway_address(&self.subnet)
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    /// Release the subnet and address back to the pool the allocation came from
    pub fn dismantle(self) -> Result<(), FenceError> {
        self.pool.release(self.subnet, self.container_ip)
    }

    /// Short `subnet, ip` description for logs and errors
    pub fn describe(&self) -> String {
        self.to_string()
    }

    pub fn to_flat(&self) -> FlatFence {
        FlatFence {
            ipn: self.subnet.to_string(),
            container_ip: self.container_ip.to_string(),
        }
    }

    /// Encode the allocation as the JSON record `Fence::rebuild` accepts
    pub fn serialize(&self) -> Result<Vec<u8>, FenceError> {
        serde_json::to_vec(&self.to_flat()).map_err(|e| FenceError::Encode(e.to_string()))
    }

    /// Fill the network fields of a container's info
    pub fn info(&self, info: &mut ContainerInfo) {
        info.host_ip = self.host_ip().to_string();
        info.container_ip = self.container_ip.to_string();
    }

    /// Environment handed to the namespace setup for this container.
    ///
    /// Key names and order are read by the network configuration scripts.
    pub fn process_environment(&self) -> Vec<String> {
        vec![
            format!("network_host_ip={}", self.host_ip()),
            format!("network_container_ip={}", self.container_ip),
            format!("network_cidr_suffix={}", self.subnet.prefix_len()),
            format!("container_iface_mtu={}", self.mtu),
            format!("network_cidr={}", self.subnet),
        ]
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Allocation{{{}, {}}}", self.subnet, self.container_ip)
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("subnet", &self.subnet)
            .field("container_ip", &self.container_ip)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}
