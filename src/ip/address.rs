//! CIDR and IPv4 address arithmetic.
//!
//! Pure helpers used by the pool and the fence. By convention the first host
//! address of every subnet is the gateway (the host side of the veth pair),
//! so the addresses available to a container start at `network + 2` and end
//! one before the broadcast address.

use super::error::FenceError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Address with all host bits zeroed
pub fn network_address(cidr: &Ipv4Net) -> Ipv4Addr {
    cidr.network()
}

/// Host-side address of a subnet: the network address plus one
pub fn gateway_address(cidr: &Ipv4Net) -> Ipv4Addr {
    next_address(cidr.network())
}

/// Address with all host bits set
pub fn broadcast_address(cidr: &Ipv4Net) -> Ipv4Addr {
    cidr.broadcast()
}

/// Check whether `ip` lies inside `cidr`
pub fn contains(cidr: &Ipv4Net, ip: Ipv4Addr) -> bool {
    cidr.contains(&ip)
}

/// Check whether two CIDR blocks share at least one address
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// The address numerically following `ip`, wrapping at 255.255.255.255
pub fn next_address(ip: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip).wrapping_add(1))
}

/// The address following `ip` within `cidr`, rolling over to the network
/// address once the host bits are exhausted
pub fn next_address_in(cidr: &Ipv4Net, ip: Ipv4Addr) -> Ipv4Addr {
    let mask = u32::from(cidr.netmask());
    let host = u32::from(ip).wrapping_add(1) & !mask;
    Ipv4Addr::from((u32::from(cidr.network()) & mask) | host)
}

/// Network, gateway and broadcast addresses can never be handed to a container
pub fn is_reserved(cidr: &Ipv4Net, ip: Ipv4Addr) -> bool {
    ip == network_address(cidr) || ip == gateway_address(cidr) || ip == broadcast_address(cidr)
}

/// Iterate the addresses of `cidr` that may be assigned to a container,
/// in ascending order
pub fn container_addresses(cidr: &Ipv4Net) -> ContainerAddresses {
    let cidr = cidr.trunc();
    // /31 and /32 have nothing left once network, gateway and broadcast are taken
    if cidr.prefix_len() > 30 {
        return ContainerAddresses { cidr, next: None, last: cidr.network() };
    }

    let first = next_address_in(&cidr, gateway_address(&cidr));
    let last = Ipv4Addr::from(u32::from(cidr.broadcast()) - 1);
    ContainerAddresses { cidr, next: Some(first), last }
}

/// Iterator returned by [`container_addresses`]
#[derive(Debug, Clone)]
pub struct ContainerAddresses {
    cidr: Ipv4Net,
    next: Option<Ipv4Addr>,
    last: Ipv4Addr,
}

impl Iterator for ContainerAddresses {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        let current = self.next?;
        self.next = if current == self.last {
            None
        } else {
            Some(next_address_in(&self.cidr, current))
        };
        Some(current)
    }
}

/// Parse a network spec into a CIDR, keeping any host bits the caller gave.
///
/// Accepted forms are a bare dotted quad (`10.0.0.2`), which takes
/// `default_prefix`, and CIDR notation (`10.0.0.2/30`). The returned value's
/// `addr()` is the address as written; `trunc()` gives the subnet.
pub fn parse_spec(spec: &str, default_prefix: u8) -> Result<Ipv4Net, FenceError> {
    let invalid = |reason: String| FenceError::InvalidSpec {
        spec: spec.to_string(),
        reason,
    };

    let (addr, prefix) = match spec.split_once('/') {
        Some((addr, prefix)) => {
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("invalid prefix length '{}'", prefix)));
            }
            let prefix = prefix
                .parse::<u8>()
                .map_err(|_| invalid(format!("invalid prefix length '{}'", prefix)))?;
            (addr, prefix)
        }
        None => (spec, default_prefix),
    };

    let addr = addr
        .parse::<Ipv4Addr>()
        .map_err(|e| invalid(format!("{} '{}'", e, addr)))?;

    Ipv4Net::new(addr, prefix).map_err(|e| invalid(e.to_string()))
}
