//! Progress and confirmation callbacks
//!
//! These traits let the engine report and ask questions without depending
//! on a particular terminal UI.

use crate::rule::Rejection;
use crate::types::{Outcome, ScopeSummary, WorkItem};
use std::io;
use vmkit::{Datacenter, VirtualMachine};

/// Receives per-VM reports during a run.
///
/// Item callbacks are invoked from worker threads, so implementations must
/// be `Sync` and take `&self`.
pub trait ProgressCallback: Sync {
    /// Called when a datacenter's VMs have been enumerated
    fn on_scope_start(&self, datacenter: &Datacenter, vm_count: usize);

    /// Called for every VM the selection rule rejected
    fn on_rejected(&self, vm: &VirtualMachine, rejection: &Rejection);

    /// Called for selected VMs that are not acted on
    fn on_skipped(&self, vm: &VirtualMachine, reason: &str);

    /// Called before a batch of work items is dispatched
    fn on_batch_start(&self, count: usize);

    /// Called on a worker when an item starts
    fn on_item_start(&self, item: &WorkItem);

    /// Called when an item finishes, fails, or is reported as a dry run
    fn on_item_complete(&self, item: &WorkItem, outcome: &Outcome);

    /// Called after every item of a batch has finished
    fn on_batch_complete(&self);

    /// Called when a datacenter is done
    fn on_scope_complete(&self, summary: &ScopeSummary);
}

/// Asks the operator before a batch of changes is made.
pub trait ConfirmCallback {
    /// `true` to proceed
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_scope_start(&self, _datacenter: &Datacenter, _vm_count: usize) {}
    fn on_rejected(&self, _vm: &VirtualMachine, _rejection: &Rejection) {}
    fn on_skipped(&self, _vm: &VirtualMachine, _reason: &str) {}
    fn on_batch_start(&self, _count: usize) {}
    fn on_item_start(&self, _item: &WorkItem) {}
    fn on_item_complete(&self, _item: &WorkItem, _outcome: &Outcome) {}
    fn on_batch_complete(&self) {}
    fn on_scope_complete(&self, _summary: &ScopeSummary) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> io::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> io::Result<bool> {
        Ok(false)
    }
}
