//! Resource-usage accounting for awaited child processes.
//!
//! The kernel aggregates `RUSAGE_CHILDREN` counters over every child the
//! process has ever waited on, so a single query cannot be attributed to one
//! command. [`ChildUsage::snapshot`] captures the running totals and
//! [`ChildUsage::since`] subtracts an earlier capture, leaving the portion
//! accumulated between the two. Peak RSS is a high-water mark rather than a
//! running total and cannot be differenced; `since` keeps the later value.

use nix::errno::Errno;
use nix::sys::resource::{UsageWho, getrusage};
use nix::sys::time::TimeVal;

/// Per-command resource counters, in the units the report prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildUsage {
    /// CPU time spent in user mode, milliseconds.
    pub user_ms: i64,
    /// CPU time spent in kernel mode, milliseconds.
    pub system_ms: i64,
    pub voluntary_switches: i64,
    pub involuntary_switches: i64,
    pub major_faults: i64,
    pub minor_faults: i64,
    /// Peak resident set size in KB. High-water mark across all waited
    /// children, not a per-command delta.
    pub max_rss_kb: i64,
}

fn timeval_ms(tv: TimeVal) -> i64 {
    tv.tv_sec() as i64 * 1000 + tv.tv_usec() as i64 / 1000
}

impl ChildUsage {
    /// Capture the cumulative usage of all children waited on so far.
    pub fn snapshot() -> Result<Self, Errno> {
        let usage = getrusage(UsageWho::RUSAGE_CHILDREN)?;
        Ok(Self {
            user_ms: timeval_ms(usage.user_time()),
            system_ms: timeval_ms(usage.system_time()),
            voluntary_switches: usage.voluntary_context_switches() as i64,
            involuntary_switches: usage.involuntary_context_switches() as i64,
            major_faults: usage.major_page_faults() as i64,
            minor_faults: usage.minor_page_faults() as i64,
            max_rss_kb: usage.max_rss() as i64,
        })
    }

    /// Usage accumulated after `earlier` was captured.
    ///
    /// Valid only when no other child was waited on between the two
    /// snapshots; the interpreter guarantees that by never reaping
    /// background jobs while a foreground wait is in flight.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            user_ms: self.user_ms.saturating_sub(earlier.user_ms),
            system_ms: self.system_ms.saturating_sub(earlier.system_ms),
            voluntary_switches: self
                .voluntary_switches
                .saturating_sub(earlier.voluntary_switches),
            involuntary_switches: self
                .involuntary_switches
                .saturating_sub(earlier.involuntary_switches),
            major_faults: self.major_faults.saturating_sub(earlier.major_faults),
            minor_faults: self.minor_faults.saturating_sub(earlier.minor_faults),
            max_rss_kb: self.max_rss_kb,
        }
    }
}
