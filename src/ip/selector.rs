//! Subnet and IP selection policies.
//!
//! A request to the pool is a pair of selectors: one decides which subnet to
//! use, the other which address inside it. Both run while the pool's lock is
//! held, so the ledger they read cannot change between the two decisions.

use super::address;
use super::error::FenceError;
use super::pool::{AddressRange, Ledger};
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// How the subnet of an allocation is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetSelector {
    /// Numerically lowest free subnet of the range's default prefix length
    Dynamic,
    /// Exactly this subnet; it must not overlap anything already allocated
    Static(Ipv4Net),
    /// This subnet, sharing an identical subnet restored earlier in the same
    /// recovery pass if there is one
    Recovered(Ipv4Net),
}

impl SubnetSelector {
    pub(crate) fn select(&self, range: &AddressRange, ledger: &Ledger) -> Result<Ipv4Net, FenceError> {
        match *self {
            SubnetSelector::Dynamic => range
                .subnets()
                .find(|candidate| ledger.overlapping(candidate).is_none())
                .ok_or(FenceError::SubnetsExhausted { range: range.network() }),
            SubnetSelector::Static(requested) => {
                let requested = requested.trunc();
                range.check_contains(&requested)?;
                match ledger.overlapping(&requested) {
                    Some(existing) => Err(FenceError::SubnetOverlap { requested, existing }),
                    None => Ok(requested),
                }
            }
            SubnetSelector::Recovered(requested) => {
                let requested = requested.trunc();
                range.check_contains(&requested)?;
                match ledger.overlapping(&requested) {
                    Some(existing) if existing != requested => {
                        Err(FenceError::SubnetOverlap { requested, existing })
                    }
                    _ => Ok(requested),
                }
            }
        }
    }
}

/// How the container address inside the chosen subnet is picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpSelector {
    /// Lowest free container address in the subnet
    Dynamic,
    /// Exactly this address
    Static(Ipv4Addr),
}

impl IpSelector {
    pub(crate) fn select(&self, subnet: &Ipv4Net, taken: Option<&BTreeSet<Ipv4Addr>>) -> Result<Ipv4Addr, FenceError> {
        let is_taken = |ip: &Ipv4Addr| taken.map_or(false, |ips| ips.contains(ip));

        match *self {
            IpSelector::Dynamic => address::container_addresses(subnet)
                .find(|ip| !is_taken(ip))
                .ok_or(FenceError::SubnetFull { subnet: *subnet }),
            IpSelector::Static(ip) => {
                if !address::contains(subnet, ip) {
                    return Err(FenceError::AddressOutOfRange { ip, subnet: *subnet });
                }
                if address::is_reserved(subnet, ip) || is_taken(&ip) {
                    return Err(FenceError::AddressInUse { ip, subnet: *subnet });
                }
                Ok(ip)
            }
        }
    }
}
