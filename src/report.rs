//! Terminal reporting for sweep runs

use crate::Context;
use crate::progress;
use crate::ui;
use colored::Colorize;
use indicatif::ProgressBar;
use std::io;
use std::sync::{Mutex, PoisonError};
use sweep::{
    ConfirmCallback, Outcome, ProgressCallback, Rejection, RunSummary, ScopeSummary, Summary,
    WorkItem,
};
use vmkit::{Datacenter, VirtualMachine};

/// How an outcome is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Done,
    Skipped,
    Failed,
    Info,
}

fn describe(item: &WorkItem, outcome: &Outcome) -> (Mark, String) {
    let name = &item.vm.name;
    match outcome {
        Outcome::Relocated { datastore } => {
            (Mark::Done, format!("{name}: {} to {datastore}", item.action.verb()))
        }
        Outcome::MediaRemoved { drives } => (
            Mark::Done,
            format!("{name}: {} ({drives} drive(s))", item.action.verb()),
        ),
        Outcome::SnapshotsRemoved { count } => (
            Mark::Done,
            format!("{name}: {} ({count})", item.action.verb()),
        ),
        Outcome::NoChange { reason } => (Mark::Skipped, format!("{name}: skipped, {reason}")),
        Outcome::DryRun { changes } => (
            Mark::Info,
            format!("{name}: would {}", changes.join("; ")),
        ),
        Outcome::Failed { error } => (Mark::Failed, format!("{name}: {error}")),
    }
}

fn print(mark: Mark, line: &str) {
    match mark {
        Mark::Done => ui::success(line),
        Mark::Skipped => ui::skip(line),
        Mark::Failed => ui::error(line),
        Mark::Info => ui::info(line),
    }
}

/// Prints per-VM outcomes and a progress bar while a batch runs.
pub struct Reporter {
    verbose: u8,
    quiet: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl Reporter {
    pub fn new(ctx: &Context) -> Self {
        Self {
            verbose: ctx.verbose,
            quiet: ctx.quiet,
            bar: Mutex::new(None),
        }
    }

    /// Print above the progress bar, if one is showing.
    fn emit(&self, mark: Mark, line: &str) {
        if self.quiet && mark != Mark::Failed {
            return;
        }
        let bar = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        match bar.as_ref() {
            Some(pb) => pb.suspend(|| print(mark, line)),
            None => print(mark, line),
        }
    }

    pub fn print_summary(&self, summary: &RunSummary) {
        if self.quiet {
            return;
        }
        let total = summary.total();
        ui::section("Summary");
        if summary.scopes.len() > 1 {
            for scope in &summary.scopes {
                ui::kv(&scope.datacenter, &counts(&scope.summary));
            }
        }
        ui::kv("Total", &counts(&total));
        println!();
        if total.is_success() {
            ui::success("Done");
        } else {
            ui::warn(&format!("{} VM(s) failed", total.failed));
        }
    }
}

fn counts(summary: &Summary) -> String {
    let mut parts = vec![
        format!("{} considered", summary.considered),
        format!("{} selected", summary.selected),
    ];
    for (n, label) in [
        (summary.changed, "changed"),
        (summary.dry_run, "dry run"),
        (summary.skipped, "skipped"),
        (summary.excluded, "excluded"),
    ] {
        if n > 0 {
            parts.push(format!("{n} {label}"));
        }
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().to_string());
    }
    parts.join(", ")
}

impl ProgressCallback for Reporter {
    fn on_scope_start(&self, datacenter: &Datacenter, vm_count: usize) {
        if !self.quiet {
            ui::section(&format!("Datacenter {} ({} VMs)", datacenter.name, vm_count));
        }
    }

    fn on_rejected(&self, vm: &VirtualMachine, rejection: &Rejection) {
        match rejection {
            Rejection::Excluded => self.emit(Mark::Skipped, &format!("{}: excluded", vm.name)),
            other if self.verbose > 0 && !self.quiet => {
                ui::dim(&format!("{}: {}", vm.name, other));
            }
            _ => {}
        }
    }

    fn on_skipped(&self, vm: &VirtualMachine, reason: &str) {
        self.emit(Mark::Skipped, &format!("{}: skipped, {}", vm.name, reason));
    }

    fn on_batch_start(&self, count: usize) {
        if self.quiet {
            return;
        }
        let pb = progress::bar(count as u64, "Working");
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
    }

    fn on_item_start(&self, item: &WorkItem) {
        let bar = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = bar.as_ref() {
            pb.set_message(item.vm.name.clone());
        }
    }

    fn on_item_complete(&self, item: &WorkItem, outcome: &Outcome) {
        let (mark, line) = describe(item, outcome);
        self.emit(mark, &line);
        let bar = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = bar.as_ref() {
            pb.inc(1);
        }
    }

    fn on_batch_complete(&self) {
        if let Some(pb) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pb.finish_and_clear();
        }
    }

    fn on_scope_complete(&self, summary: &ScopeSummary) {
        log::info!("{}: {}", summary.datacenter, counts(&summary.summary));
    }
}

/// Asks on the terminal before each batch.
///
/// Proceeds without asking when `--yes` was given or nobody is attached to
/// the terminal.
pub struct PromptConfirm {
    assume_yes: bool,
}

impl PromptConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        if !console::Term::stdout().is_term() {
            log::info!("Not attached to a terminal, proceeding: {prompt}");
            return Ok(true);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
