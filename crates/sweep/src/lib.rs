//! # Sweep
//!
//! Rule-based selection and bounded concurrent remediation of virtual
//! machines.
//!
//! ## Core Concepts
//!
//! - **SelectionRule**: Ordered checks deciding whether a VM is in scope
//! - **Action**: What happens to a selected VM (relocate storage, eject ISO
//!   media, remove snapshots)
//! - **TemplateGuard**: Converts templates to runtime VMs around an action
//! - **Dispatcher**: Runs work items on a fixed number of worker threads
//! - **Driver**: Walks every datacenter, selects, previews and dispatches
//!
//! ## Example
//!
//! ```ignore
//! use sweep::{Action, Plan, RunOptions, SelectionRule, run_simple};
//! use vmkit::PowerState;
//!
//! let plan = Plan::new(
//!     SelectionRule::builder()
//!         .name(Some("^web"))
//!         .power_state(Some(PowerState::PoweredOn)),
//!     Action::Relocate { destination: "slow".into() },
//! )?;
//!
//! let summary = run_simple(&*connection, &plan, &RunOptions::default())?;
//! println!("{} migrated", summary.total().changed);
//! ```
//!
//! ## Callbacks
//!
//! - [`ProgressCallback`]: Receives per-VM reports, from worker threads
//! - [`ConfirmCallback`]: Asked before each batch of changes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod guard;
pub mod rule;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use action::{Action, SnapshotTarget};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use dispatch::dispatch;
pub use driver::{DEFAULT_SETTLE, Plan, RunOptions, run, run_simple};
pub use error::{Result, SweepError};
pub use guard::TemplateGuard;
pub use rule::{Rejection, RuleBuilder, SelectionRule, Verdict};
pub use types::{Outcome, RunSummary, Scope, ScopeSummary, Summary, WorkItem};
