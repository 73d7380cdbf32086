//! # Netfence - IPv4 network allocation for sandboxed containers
//!
//! This library decides the network identity of every container on a single
//! host: which subnet it lives in, which address the host side of its link
//! uses, and which address the container gets.
//!
//! ## Overview
//!
//! A configured address range (by default `10.254.0.0/22`) is carved into
//! per-container subnets (by default `/30`: network, gateway, container,
//! broadcast). Containers may ask for any subnet, a specific subnet, or a
//! specific address, and the allocations survive a restart of the managing
//! process through small JSON records.
//!
//! ## Key Features
//!
//! - **No overlaps**: two containers never receive intersecting address ranges
//! - **Dynamic or static**: `""`, `"10.254.0.8/30"` or `"10.254.0.10/30"`
//! - **Recovery**: persisted records rebuild the pool after a restart, with
//!   bad records isolated from healthy ones
//! - **Thread safe**: one pool shared by concurrent create/destroy operations
//!
//! ## Architecture
//!
//! - `ip`: CIDR arithmetic, selection policies and the shared subnet pool
//! - `fence`: the facade building, rebuilding and dismantling allocations
//! - `config` / `config_loader`: YAML configuration and validation
//! - `state`: directory of persisted allocation records
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netfence::{config_loader, fence::Fence, state::StateDir};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("netfence.yaml"))?;
//! let fence = Fence::from_config(&config.network)?;
//!
//! // Restore what a previous run handed out
//! let state = StateDir::open("/var/lib/netfence")?;
//! let report = fence.recover_all(state.records()?);
//! for (id, error) in &report.failed {
//!     eprintln!("{}: {}", id, error);
//! }
//!
//! // Network a new container
//! let allocation = fence.build("")?;
//! state.save("web-1", &allocation)?;
//! for var in allocation.process_environment() {
//!     println!("{}", var);
//! }
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   log_level: info
//!
//! network:
//!   pool: "10.254.0.0/22"
//!   subnet_prefix: 30
//!   mtu: 1500
//! ```
//!
//! ## Error Handling
//!
//! Allocation failures are reported as [`ip::FenceError`] and never retried
//! internally. Configuration and state directory code returns
//! `color_eyre::Result` with context attached.

pub mod config;
pub mod config_loader;
pub mod fence;
pub mod ip;
pub mod state;
