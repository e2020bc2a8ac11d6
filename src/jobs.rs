//! Tracking of background child processes.
//!
//! The [`JobTable`] owns every child spawned with a trailing `&`. Entries
//! keep their insertion order, and a job's display slot is its 1-based
//! position in the table, so removing an entry shifts the slots of the
//! entries behind it. Completion is observed only through [`JobTable::reconcile`],
//! a non-blocking poll over all entries driven by the interactive loop.

use std::io;
use std::process::{Child, ExitStatus};

use thiserror::Error;
use tracing::{debug, warn};

/// Default number of jobs a table accepts before refusing registrations.
pub const DEFAULT_CAPACITY: usize = 32;

/// Display labels longer than this many characters are clipped on
/// registration. Only the label is affected; the command itself runs with
/// its full argument list.
pub const MAX_NAME_LEN: usize = 128;

/// Errors produced by job-table operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// The table already holds `capacity` live jobs.
    #[error("job table is full ({capacity} jobs)")]
    CapacityExceeded { capacity: usize },
}

/// A spawned child whose completion has not yet been observed.
#[derive(Debug)]
struct BackgroundJob {
    child: Child,
    name: String,
}

/// One terminated (or unpollable) job reported by [`JobTable::reconcile`].
///
/// `slot` is the display index the job had at the moment it was reported,
/// i.e. after jobs removed earlier in the same pass had already shifted the
/// table.
#[derive(Debug)]
pub struct Completion {
    pub slot: usize,
    pub pid: u32,
    pub name: String,
    /// The wait outcome, or the error that made the job unpollable. The
    /// entry is removed from the table either way.
    pub result: io::Result<ExitStatus>,
}

/// A live entry as seen by [`JobTable::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEntry<'a> {
    pub slot: usize,
    pub pid: u32,
    pub name: &'a str,
}

/// Ordered, bounded collection of background jobs.
///
/// Single-threaded by design: the interactive loop is the only caller, so
/// registration and reconciliation can never overlap and no locking is
/// needed.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<BackgroundJob>,
    capacity: usize,
}

impl JobTable {
    /// A table with the default capacity of [`DEFAULT_CAPACITY`] jobs.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take ownership of a spawned child and return its 1-based display slot.
    ///
    /// Fails with [`JobError::CapacityExceeded`] when the table is full. A
    /// rejected child is dropped untracked, so callers that spawn should
    /// check [`JobTable::is_full`] before creating the process.
    pub fn register(
        &mut self,
        child: Child,
        name: impl Into<String>,
    ) -> Result<usize, JobError> {
        if self.is_full() {
            return Err(JobError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let name = clip_name(name.into());
        let pid = child.id();
        self.jobs.push(BackgroundJob { child, name });
        let slot = self.jobs.len();
        debug!(pid, slot, "registered background job");
        Ok(slot)
    }

    /// Poll every job for completion without blocking.
    ///
    /// Terminated jobs are removed and reported in table order; remaining
    /// entries shift down to fill the gaps. A job whose poll fails is also
    /// removed, with the error carried in its [`Completion`], so a broken
    /// entry cannot occupy a slot forever.
    pub fn reconcile(&mut self) -> Vec<Completion> {
        let mut completed = Vec::new();
        let mut index = 0;
        while index < self.jobs.len() {
            let result = match self.jobs[index].child.try_wait() {
                Ok(None) => {
                    index += 1;
                    continue;
                }
                Ok(Some(status)) => Ok(status),
                Err(err) => Err(err),
            };
            let job = self.jobs.remove(index);
            let pid = job.child.id();
            match &result {
                Ok(status) => debug!(pid, %status, "background job completed"),
                Err(err) => warn!(pid, %err, "background job poll failed, dropping entry"),
            }
            completed.push(Completion {
                slot: index + 1,
                pid,
                name: job.name,
                result,
            });
        }
        completed
    }

    /// Snapshot of the live entries in display order.
    pub fn list(&self) -> impl Iterator<Item = JobEntry<'_>> {
        self.jobs.iter().enumerate().map(|(index, job)| JobEntry {
            slot: index + 1,
            pid: job.child.id(),
            name: &job.name,
        })
    }
}

fn clip_name(mut name: String) -> String {
    if let Some((cut, _)) = name.char_indices().nth(MAX_NAME_LEN) {
        name.truncate(cut);
    }
    name
}
