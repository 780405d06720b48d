//! Core types for sweep runs

use crate::action::Action;
use crate::error::SweepError;
use vmkit::{Datacenter, Datastore, ResourcePoolRef, VirtualMachine};

/// One VM scheduled for an action.
///
/// Built by the driver for every VM that passes selection; consumed exactly
/// once by the dispatcher.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// VM as enumerated, before any template conversion
    pub vm: VirtualMachine,
    /// Action to run against it
    pub action: Action,
    /// Human-readable list of the changes the action will make
    pub changes: Vec<String>,
}

/// Handles resolved once per datacenter and shared by its work items.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Datacenter the work items belong to
    pub datacenter: Datacenter,
    /// Destination datastore, for actions that move storage
    pub destination: Option<Datastore>,
    /// Resource pools in conversion preference order
    pub pools: Vec<ResourcePoolRef>,
}

/// Result of running (or not running) the action for one VM.
#[derive(Debug)]
pub enum Outcome {
    /// Storage moved to the datastore
    Relocated {
        /// Datastore name
        datastore: String,
    },
    /// ISO media ejected from this many drives
    MediaRemoved {
        /// Drives edited
        drives: usize,
    },
    /// This many snapshots deleted
    SnapshotsRemoved {
        /// Snapshots removed, descendants included
        count: usize,
    },
    /// The action found nothing to change
    NoChange {
        /// Why nothing changed
        reason: String,
    },
    /// Dry run: these changes would have been made
    DryRun {
        /// Pending changes, one line each
        changes: Vec<String>,
    },
    /// The action failed
    Failed {
        /// What went wrong
        error: SweepError,
    },
}

impl Outcome {
    /// Whether the action failed for this VM.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Whether the VM was actually modified.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Outcome::Relocated { .. } | Outcome::MediaRemoved { .. } | Outcome::SnapshotsRemoved { .. }
        )
    }
}

/// Counters for one datacenter or a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// VMs enumerated
    pub considered: usize,
    /// VMs that passed the selection rule
    pub selected: usize,
    /// VMs rejected by the exclude pattern
    pub excluded: usize,
    /// Rejected by placement, power state, folder or name
    pub not_matched: usize,
    /// Selected but nothing to do, or declined at the prompt
    pub skipped: usize,
    /// VMs the action modified
    pub changed: usize,
    /// VMs reported but left untouched by a dry run
    pub dry_run: usize,
    /// VMs whose action failed
    pub failed: usize,
}

impl Summary {
    /// Count one outcome.
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Relocated { .. }
            | Outcome::MediaRemoved { .. }
            | Outcome::SnapshotsRemoved { .. } => self.changed += 1,
            Outcome::NoChange { .. } => self.skipped += 1,
            Outcome::DryRun { .. } => self.dry_run += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Add every counter of `other`.
    pub fn merge(&mut self, other: &Summary) {
        self.considered += other.considered;
        self.selected += other.selected;
        self.excluded += other.excluded;
        self.not_matched += other.not_matched;
        self.skipped += other.skipped;
        self.changed += other.changed;
        self.dry_run += other.dry_run;
        self.failed += other.failed;
    }

    /// No VM failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Summary for one datacenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSummary {
    /// Datacenter name
    pub datacenter: String,
    /// Counters for that datacenter
    pub summary: Summary,
}

/// Summary of a whole run, per datacenter in processing order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per datacenter
    pub scopes: Vec<ScopeSummary>,
}

impl RunSummary {
    /// Counters summed over every datacenter.
    pub fn total(&self) -> Summary {
        let mut total = Summary::default();
        for scope in &self.scopes {
            total.merge(&scope.summary);
        }
        total
    }

    /// No VM failed in any datacenter.
    pub fn is_success(&self) -> bool {
        self.total().is_success()
    }
}
