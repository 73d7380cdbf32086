//! Startup recovery of persisted allocations.
//!
//! After a restart every container record is fed back through
//! [`Fence::rebuild`]. Records are independent: one that fails to decode or
//! conflicts with an earlier one is reported against its own key and the
//! rest are still recovered.

use super::{Allocation, Fence};
use crate::ip::FenceError;
use log::{info, warn};
use std::fmt::Display;

/// Outcome of recovering a batch of records
#[derive(Debug)]
pub struct RecoveryReport<K> {
    pub recovered: Vec<(K, Allocation)>,
    pub failed: Vec<(K, FenceError)>,
}

impl<K> RecoveryReport<K> {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Fence {
    /// Rebuild every `(key, record)` pair, in order
    pub fn recover_all<K, B, I>(&self, records: I) -> RecoveryReport<K>
    where
        K: Display,
        B: AsRef<[u8]>,
        I: IntoIterator<Item = (K, B)>,
    {
        let mut report = RecoveryReport {
            recovered: Vec::new(),
            failed: Vec::new(),
        };

        for (key, record) in records {
            match self.rebuild(record.as_ref()) {
                Ok(allocation) => {
                    info!("Recovered {} for {}", allocation, key);
                    report.recovered.push((key, allocation));
                }
                Err(e) => {
                    warn!("Failed to recover network allocation for {}: {}", key, e);
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            "Recovery complete: {} allocations restored, {} failed",
            report.recovered.len(),
            report.failed.len()
        );
        report
    }
}
