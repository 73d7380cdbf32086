//! IPv4 subnet allocation.
//!
//! This module owns the host's container address space: CIDR arithmetic,
//! the subnet/IP selection policies and the shared pool that records what
//! has been handed out.

pub mod address;
pub mod error;
pub mod pool;
pub mod selector;

// Re-export commonly used types
pub use error::FenceError;
pub use pool::{AddressRange, SubnetPool};
pub use selector::{IpSelector, SubnetSelector};
