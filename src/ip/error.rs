//! Allocation errors.
//!
//! Every failure the allocator can report. None of these are retried
//! internally; the caller decides whether to try again with another spec.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Errors returned by the subnet pool and the fence built on top of it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenceError {
    #[error("Invalid network spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("Malformed fence state: {0}")]
    MalformedState(String),

    #[error("Insufficient subnets remaining in the pool {range}")]
    SubnetsExhausted { range: Ipv4Net },

    #[error("Subnet {requested} overlaps an existing subnet {existing}")]
    SubnetOverlap { requested: Ipv4Net, existing: Ipv4Net },

    #[error("Subnet {subnet} lies outside the address range {range}")]
    SubnetOutOfRange { subnet: Ipv4Net, range: Ipv4Net },

    #[error("Insufficient IPs remaining in subnet {subnet}")]
    SubnetFull { subnet: Ipv4Net },

    #[error("The requested IP {ip} is not within the subnet {subnet}")]
    AddressOutOfRange { ip: Ipv4Addr, subnet: Ipv4Net },

    #[error("The requested IP {ip} is already allocated in subnet {subnet}")]
    AddressInUse { ip: Ipv4Addr, subnet: Ipv4Net },

    #[error("IP {ip} in subnet {subnet} is not allocated")]
    NotAllocated { ip: Ipv4Addr, subnet: Ipv4Net },

    #[error("Invalid address range: {0}")]
    InvalidRange(String),

    #[error("Failed to encode fence state: {0}")]
    Encode(String),
}
