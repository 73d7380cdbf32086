//! Subnet pool.
//!
//! The pool owns every allocation decision on the host. It tracks which
//! subnets of its address range are in use and which container addresses are
//! taken inside each of them. Allocated subnets never overlap; a subnet stays
//! allocated for as long as at least one container address inside it is.
//!
//! All state lives behind a single lock. `allocate`, `recover` and `release`
//! each take it once and hold it for the whole request, so a subnet reservation
//! and the address reservation inside it become visible together or not at all.

use super::address;
use super::error::FenceError;
use super::selector::{IpSelector, SubnetSelector};
use ipnet::Ipv4Net;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// The block the pool carves subnets from, and the size of those subnets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    network: Ipv4Net,
    subnet_prefix: u8,
}

impl AddressRange {
    /// Create a range. `network` must not have host bits set, and
    /// `subnet_prefix` must be between the range's own prefix length and 30
    /// so every default subnet holds at least one container address.
    pub fn new(network: Ipv4Net, subnet_prefix: u8) -> Result<Self, FenceError> {
        if network != network.trunc() {
            return Err(FenceError::InvalidRange(format!(
                "{} has host bits set (did you mean {}?)",
                network,
                network.trunc()
            )));
        }
        if subnet_prefix < network.prefix_len() || subnet_prefix > 30 {
            return Err(FenceError::InvalidRange(format!(
                "subnet prefix /{} must be between /{} and /30",
                subnet_prefix,
                network.prefix_len()
            )));
        }

        Ok(AddressRange { network, subnet_prefix })
    }

    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    pub fn subnet_prefix(&self) -> u8 {
        self.subnet_prefix
    }

    /// Default-sized subnets of the range, lowest first
    pub fn subnets(&self) -> impl Iterator<Item = Ipv4Net> {
        self.network.subnets(self.subnet_prefix).into_iter().flatten()
    }

    /// Number of default-sized subnets in the range
    pub fn capacity(&self) -> usize {
        1usize
            .checked_shl(u32::from(self.subnet_prefix - self.network.prefix_len()))
            .unwrap_or(usize::MAX)
    }

    pub(crate) fn check_contains(&self, subnet: &Ipv4Net) -> Result<(), FenceError> {
        if self.network.contains(subnet) {
            Ok(())
        } else {
            Err(FenceError::SubnetOutOfRange {
                subnet: *subnet,
                range: self.network,
            })
        }
    }
}

/// Allocated subnets and the container addresses taken in each
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    subnets: BTreeMap<Ipv4Net, BTreeSet<Ipv4Addr>>,
}

impl Ledger {
    /// The allocated subnet sharing addresses with `subnet`, if any.
    ///
    /// Allocated subnets are disjoint, so when anything overlaps `subnet` the
    /// allocated subnet with the highest network address not above
    /// `subnet`'s broadcast address does.
    pub(crate) fn overlapping(&self, subnet: &Ipv4Net) -> Option<Ipv4Net> {
        let upper = Ipv4Net::from(subnet.broadcast());
        self.subnets
            .range(..=upper)
            .next_back()
            .map(|(existing, _)| *existing)
            .filter(|existing| address::overlaps(existing, subnet))
    }

    pub(crate) fn addresses(&self, subnet: &Ipv4Net) -> Option<&BTreeSet<Ipv4Addr>> {
        self.subnets.get(subnet)
    }

    pub(crate) fn insert(&mut self, subnet: Ipv4Net, ip: Ipv4Addr) {
        self.subnets.entry(subnet).or_default().insert(ip);
    }

    /// Drop `ip` from `subnet`, and the subnet itself once it is empty.
    /// Returns false if the pair was not recorded.
    fn remove(&mut self, subnet: &Ipv4Net, ip: Ipv4Addr) -> bool {
        let Some(ips) = self.subnets.get_mut(subnet) else {
            return false;
        };
        if !ips.remove(&ip) {
            return false;
        }
        if ips.is_empty() {
            self.subnets.remove(subnet);
        }
        true
    }
}

/// Shared allocation ledger for every container network on the host
#[derive(Debug)]
pub struct SubnetPool {
    range: AddressRange,
    ledger: Mutex<Ledger>,
}

impl SubnetPool {
    pub fn new(range: AddressRange) -> Self {
        info!(
            "Subnet pool covers {} with /{} subnets ({} available)",
            range.network(),
            range.subnet_prefix(),
            range.capacity()
        );
        SubnetPool {
            range,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn range(&self) -> &AddressRange {
        &self.range
    }

    /// Number of default-sized subnets the pool can hand out
    pub fn capacity(&self) -> usize {
        self.range.capacity()
    }

    /// Allocate a subnet and a container address inside it.
    ///
    /// The subnet selector runs first; the IP selector then runs against the
    /// addresses already taken in that subnet. Nothing is recorded unless both
    /// succeed.
    pub fn allocate(&self, subnet_selector: SubnetSelector, ip_selector: IpSelector) -> Result<(Ipv4Net, Ipv4Addr), FenceError> {
        let mut ledger = self.ledger.lock();

        let subnet = subnet_selector.select(&self.range, &ledger)?;
        let ip = ip_selector.select(&subnet, ledger.addresses(&subnet))?;
        ledger.insert(subnet, ip);

        debug!("Allocated {} in subnet {} ({:?}, {:?})", ip, subnet, subnet_selector, ip_selector);
        Ok((subnet, ip))
    }

    /// Re-register an allocation made by a previous run of the process.
    ///
    /// Behaves like a fully static `allocate`, except that a subnet restored
    /// earlier in the same pass is shared rather than reported as an overlap.
    pub fn recover(&self, subnet: Ipv4Net, ip: Ipv4Addr) -> Result<(), FenceError> {
        let mut ledger = self.ledger.lock();

        let subnet = SubnetSelector::Recovered(subnet).select(&self.range, &ledger)?;
        let ip = IpSelector::Static(ip).select(&subnet, ledger.addresses(&subnet))?;
        ledger.insert(subnet, ip);

        debug!("Recovered {} in subnet {}", ip, subnet);
        Ok(())
    }

    /// Return a container address to the pool, and its subnet too once the
    /// subnet has no addresses left
    pub fn release(&self, subnet: Ipv4Net, ip: Ipv4Addr) -> Result<(), FenceError> {
        let subnet = subnet.trunc();
        let mut ledger = self.ledger.lock();

        if !ledger.remove(&subnet, ip) {
            error!("Release of untracked allocation {} in subnet {}", ip, subnet);
            return Err(FenceError::NotAllocated { ip, subnet });
        }

        debug!("Released {} in subnet {}", ip, subnet);
        Ok(())
    }

    /// Snapshot of the ledger, ordered by subnet
    pub fn allocated_subnets(&self) -> Vec<(Ipv4Net, Vec<Ipv4Addr>)> {
        self.ledger
            .lock()
            .subnets
            .iter()
            .map(|(subnet, ips)| (*subnet, ips.iter().copied().collect()))
            .collect()
    }
}
