//! Batch driver - selects, previews and dispatches work per datacenter

use crate::action::Action;
use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::dispatch::dispatch;
use crate::error::{Result, SweepError};
use crate::guard::TemplateGuard;
use crate::rule::{Rejection, RuleBuilder, SelectionRule, Verdict};
use crate::types::{Outcome, RunSummary, Scope, ScopeSummary, Summary, WorkItem};
use std::time::Duration;
use vmkit::{Datacenter, Session};

/// Delay after converting a template before acting on it.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Report intended changes without making any
    pub dry_run: bool,
    /// Concurrency ceiling
    pub threads: usize,
    /// Delay after template conversion
    pub settle: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            threads: 1,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// A selection rule paired with the action applied to matching VMs.
#[derive(Debug, Clone)]
pub struct Plan {
    rule: SelectionRule,
    action: Action,
}

impl Plan {
    /// Build the rule, checking placement on the action's device kind and
    /// against its destination.
    pub fn new(rule: RuleBuilder, action: Action) -> Result<Self> {
        let rule = rule
            .device_kind(action.placement_kind())
            .destination_datastore(action.destination())
            .build()?;
        Ok(Self { rule, action })
    }

    /// Action applied to selected VMs.
    pub fn action(&self) -> &Action {
        &self.action
    }
}

/// Run `plan` over every datacenter the session can see.
///
/// Per-VM failures are counted in the summary; only fatal errors
/// (configuration, inventory enumeration, prompting) are returned.
pub fn run<P, C>(
    session: &dyn Session,
    plan: &Plan,
    options: &RunOptions,
    progress: &P,
    confirm: &mut C,
) -> Result<RunSummary>
where
    P: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    let datacenters = session.list_datacenters()?;
    log::info!("Found {} datacenter(s)", datacenters.len());

    // Resolve everything up front so a missing datastore aborts before any change
    let scopes = datacenters
        .into_iter()
        .map(|dc| resolve_scope(session, dc, &plan.action))
        .collect::<Result<Vec<_>>>()?;

    let mut summary = RunSummary::default();
    for scope in &scopes {
        let scope_summary = ScopeSummary {
            datacenter: scope.datacenter.name.clone(),
            summary: run_scope(session, plan, scope, options, progress, confirm)?,
        };
        progress.on_scope_complete(&scope_summary);
        summary.scopes.push(scope_summary);
    }

    Ok(summary)
}

/// [`run`] without progress reporting or confirmation.
pub fn run_simple(session: &dyn Session, plan: &Plan, options: &RunOptions) -> Result<RunSummary> {
    run(session, plan, options, &NoProgress, &mut AutoConfirm)
}

fn resolve_scope(session: &dyn Session, datacenter: Datacenter, action: &Action) -> Result<Scope> {
    let destination = match action.destination() {
        Some(name) => {
            let datastores = session.list_datastores(&datacenter)?;
            let found = datastores.into_iter().find(|ds| ds.name == name);
            if found.is_none() {
                return Err(SweepError::Configuration(format!(
                    "datastore {name} not found in datacenter {}",
                    datacenter.name
                )));
            }
            found
        }
        None => None,
    };

    let pools = session
        .resource_pool(&datacenter)?
        .map(|root| root.flatten())
        .unwrap_or_default();
    log::debug!(
        "{}: {} resource pool(s) available for template conversion",
        datacenter.name,
        pools.len()
    );

    Ok(Scope {
        datacenter,
        destination,
        pools,
    })
}

fn run_scope<P, C>(
    session: &dyn Session,
    plan: &Plan,
    scope: &Scope,
    options: &RunOptions,
    progress: &P,
    confirm: &mut C,
) -> Result<Summary>
where
    P: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    let vms = session.list_virtual_machines(&scope.datacenter)?;
    progress.on_scope_start(&scope.datacenter, vms.len());

    let mut summary = Summary {
        considered: vms.len(),
        ..Default::default()
    };
    let mut items = Vec::new();

    for vm in vms {
        log::debug!("{}: considering {}", scope.datacenter.name, vm.name);
        if let Verdict::Rejected(rejection) = plan.rule.evaluate(&vm) {
            log::info!("{}: not selected ({})", vm.name, rejection);
            if rejection == Rejection::Excluded {
                summary.excluded += 1;
            } else {
                summary.not_matched += 1;
            }
            progress.on_rejected(&vm, &rejection);
            continue;
        }
        summary.selected += 1;

        match plan.action.pending_changes(&vm) {
            Ok(changes) if changes.is_empty() => {
                summary.skipped += 1;
                progress.on_skipped(&vm, "nothing to do");
            }
            Ok(changes) => {
                for change in &changes {
                    log::info!("{}: {}", vm.name, change);
                }
                items.push(WorkItem {
                    vm,
                    action: plan.action.clone(),
                    changes,
                });
            }
            Err(error) => {
                let item = WorkItem {
                    vm,
                    action: plan.action.clone(),
                    changes: Vec::new(),
                };
                let outcome = Outcome::Failed { error };
                progress.on_item_complete(&item, &outcome);
                summary.add_outcome(&outcome);
            }
        }
    }

    if items.is_empty() {
        return Ok(summary);
    }

    if options.dry_run {
        for item in &items {
            let outcome = Outcome::DryRun {
                changes: item.changes.clone(),
            };
            progress.on_item_complete(item, &outcome);
            summary.add_outcome(&outcome);
        }
        return Ok(summary);
    }

    let prompt = format!(
        "{} on {} VM(s) in datacenter {}?",
        plan.action,
        items.len(),
        scope.datacenter.name
    );
    if !confirm.confirm(&prompt)? {
        for item in &items {
            summary.skipped += 1;
            progress.on_skipped(&item.vm, "declined");
        }
        return Ok(summary);
    }

    progress.on_batch_start(items.len());
    let guard = TemplateGuard::new(session, &scope.pools, options.settle);
    let results = dispatch(items, options.threads, |item: WorkItem| {
        progress.on_item_start(&item);
        let outcome = guard
            .run(&item.vm, |vm| item.action.execute(session, vm, scope))
            .unwrap_or_else(|error| Outcome::Failed { error });
        if let Outcome::Failed { error } = &outcome {
            log::warn!("{}: {}", item.vm.name, error);
        }
        progress.on_item_complete(&item, &outcome);
        outcome
    })?;
    progress.on_batch_complete();
    log::info!(
        "{}: batch finished, {} changed, {} failed",
        scope.datacenter.name,
        results.iter().filter(|o| o.is_change()).count(),
        results.iter().filter(|o| o.is_failure()).count()
    );

    for outcome in &results {
        summary.add_outcome(outcome);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SnapshotTarget;
    use crate::context::AutoDecline;
    use crate::testing::{MockSession, RecordingProgress, disk, iso, snapshot, template, vm};
    use vmkit::{Backing, PowerState};

    fn relocate_plan(destination: &str) -> Plan {
        Plan::new(
            SelectionRule::builder().power_state(Some(PowerState::PoweredOn)),
            Action::Relocate {
                destination: destination.into(),
            },
        )
        .unwrap()
    }

    fn quick() -> RunOptions {
        RunOptions {
            settle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn web01() -> vmkit::VirtualMachine {
        let mut web = vm("vm-1", "web01");
        web.devices.push(disk(2000, "fast"));
        web
    }

    #[test]
    fn test_web01_already_on_destination() {
        let session = MockSession::with_vms(vec![web01()]);
        let progress = RecordingProgress::default();
        let summary = run(&session, &relocate_plan("fast"), &quick(), &progress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(progress.rejections(), vec!["web01: already on fast".to_string()]);
        let total = summary.total();
        assert_eq!(total.selected, 0);
        assert_eq!(total.not_matched, 1);
        assert_eq!(session.calls("relocate"), 0);
    }

    #[test]
    fn test_web01_relocated_once() {
        let session = MockSession::with_vms(vec![web01()]);
        let summary = run_simple(&session, &relocate_plan("slow"), &quick()).unwrap();

        assert_eq!(summary.total().changed, 1);
        assert_eq!(session.calls("relocate"), 1);
        assert_eq!(session.vm("vm-1").devices[0].datastore(), Some("slow"));
    }

    #[test]
    fn test_relocation_is_idempotent() {
        let mut web02 = vm("vm-2", "web02");
        web02.devices.push(disk(2000, "fast"));
        let session = MockSession::with_vms(vec![web01(), web02]);
        let plan = relocate_plan("slow");

        let first = run_simple(&session, &plan, &quick()).unwrap();
        assert_eq!(first.total().changed, 2);

        let second = run_simple(&session, &plan, &quick()).unwrap();
        assert_eq!(second.total().selected, 0);
        assert_eq!(session.calls("relocate"), 2);
    }

    #[test]
    fn test_missing_destination_aborts_before_work() {
        let session = MockSession::with_vms(vec![web01()]);
        let err = run_simple(&session, &relocate_plan("nowhere"), &quick()).unwrap_err();

        assert!(matches!(err, SweepError::Configuration(_)));
        assert!(err.is_fatal());
        assert_eq!(session.calls("list_virtual_machines"), 0);
    }

    #[test]
    fn test_template_without_pool_fails_conversion() {
        let mut tmpl = template("vm-9", "tmpl01");
        tmpl.devices.push(iso(3000, "isos", "debian.iso"));
        let session = MockSession::with_vms(vec![tmpl]).without_pools();
        let plan = Plan::new(
            SelectionRule::builder().power_state(Some(PowerState::PoweredOff)),
            Action::StripOpticalMedia { source: None },
        )
        .unwrap();
        let progress = RecordingProgress::default();

        let summary = run(&session, &plan, &quick(), &progress, &mut AutoConfirm).unwrap();

        assert_eq!(summary.total().failed, 1);
        assert!(!summary.is_success());
        assert!(session.vm("vm-9").template);
        assert_eq!(session.calls("reconfigure"), 0);
        assert!(progress.failures()[0].contains("no resource pool found"));
    }

    #[test]
    fn test_template_media_stripped_and_restored() {
        let mut tmpl = template("vm-9", "tmpl01");
        tmpl.devices.push(iso(3000, "isos", "debian.iso"));
        let session = MockSession::with_vms(vec![tmpl]);
        let plan = Plan::new(
            SelectionRule::builder().power_state(Some(PowerState::PoweredOff)),
            Action::StripOpticalMedia { source: None },
        )
        .unwrap();

        let summary = run_simple(&session, &plan, &quick()).unwrap();

        assert_eq!(summary.total().changed, 1);
        let after = session.vm("vm-9");
        assert!(after.template);
        assert_eq!(after.devices[0].backing, Backing::RemotePassthrough);
    }

    #[test]
    fn test_dry_run_never_mutates() {
        let mut tmpl = template("vm-9", "tmpl01");
        tmpl.devices.push(disk(2000, "fast"));
        let mut db = vm("vm-2", "db01");
        db.devices.push(disk(2000, "fast"));
        db.snapshots = vec![snapshot("vm-2", "s1", "base", vec![])];
        let session = MockSession::with_vms(vec![web01(), db, tmpl]);
        let before = session.inventory();

        let options = RunOptions {
            dry_run: true,
            ..quick()
        };
        for action in [
            Action::Relocate {
                destination: "slow".into(),
            },
            Action::StripOpticalMedia { source: None },
            Action::RemoveSnapshots(SnapshotTarget::All),
        ] {
            let plan = Plan::new(SelectionRule::builder(), action).unwrap();
            run_simple(&session, &plan, &options).unwrap();
        }

        assert_eq!(session.inventory(), before);
        assert_eq!(session.mutating_calls(), 0);
    }

    #[test]
    fn test_dry_run_reports_changes() {
        let session = MockSession::with_vms(vec![web01()]);
        let progress = RecordingProgress::default();
        let options = RunOptions {
            dry_run: true,
            ..quick()
        };

        let summary = run(&session, &relocate_plan("slow"), &options, &progress, &mut AutoConfirm)
            .unwrap();
        assert_eq!(summary.total().dry_run, 1);
        assert_eq!(progress.dry_runs(), vec!["web01: relocate to slow".to_string()]);
    }

    #[test]
    fn test_exclusion_counted_separately() {
        let mut web02 = vm("vm-2", "web02");
        web02.devices.push(disk(2000, "fast"));
        let session = MockSession::with_vms(vec![web01(), web02]);
        let plan = Plan::new(
            SelectionRule::builder().exclude(Some("02")),
            Action::Relocate {
                destination: "slow".into(),
            },
        )
        .unwrap();

        let summary = run_simple(&session, &plan, &quick()).unwrap();
        let total = summary.total();
        assert_eq!(total.excluded, 1);
        assert_eq!(total.changed, 1);
        assert_eq!(session.vm("vm-2").devices[0].datastore(), Some("fast"));
    }

    #[test]
    fn test_declined_batch_is_skipped() {
        let session = MockSession::with_vms(vec![web01()]);
        let summary = run(
            &session,
            &relocate_plan("slow"),
            &quick(),
            &NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(summary.total().skipped, 1);
        assert_eq!(session.calls("relocate"), 0);
    }

    #[test]
    fn test_failures_do_not_abort_siblings() {
        let mut web02 = vm("vm-2", "web02");
        web02.devices.push(disk(2000, "fast"));
        let session = MockSession::with_vms(vec![web01(), web02]);
        session.fail_tasks_for("vm-1");
        let options = RunOptions {
            threads: 2,
            ..quick()
        };

        let summary = run_simple(&session, &relocate_plan("slow"), &options).unwrap();
        let total = summary.total();
        assert_eq!(total.failed, 1);
        assert_eq!(total.changed, 1);
        assert_eq!(session.vm("vm-2").devices[0].datastore(), Some("slow"));
    }

    #[test]
    fn test_ambiguous_snapshot_reported_per_vm() {
        let mut db = vm("vm-2", "db01");
        db.snapshots = vec![
            snapshot("vm-2", "s1", "nightly", vec![]),
            snapshot("vm-2", "s2", "nightly", vec![]),
        ];
        let mut app = vm("vm-3", "app01");
        app.snapshots = vec![snapshot("vm-3", "s3", "nightly", vec![])];
        let session = MockSession::with_vms(vec![db, app]);
        let plan = Plan::new(
            SelectionRule::builder(),
            Action::RemoveSnapshots(SnapshotTarget::Named("nightly".into())),
        )
        .unwrap();

        let summary = run_simple(&session, &plan, &quick()).unwrap();
        let total = summary.total();
        assert_eq!(total.failed, 1);
        assert_eq!(total.changed, 1);
        assert_eq!(session.vm("vm-2").snapshots.len(), 2);
        assert!(session.vm("vm-3").snapshots.is_empty());
    }

    #[test]
    fn test_nothing_to_do_is_skipped_without_conversion() {
        let tmpl = template("vm-9", "tmpl01");
        let session = MockSession::with_vms(vec![tmpl]);
        let plan = Plan::new(
            SelectionRule::builder(),
            Action::RemoveSnapshots(SnapshotTarget::All),
        )
        .unwrap();

        let summary = run_simple(&session, &plan, &quick()).unwrap();
        assert_eq!(summary.total().skipped, 1);
        assert_eq!(session.calls("mark_as_virtual_machine"), 0);
    }

    #[test]
    fn test_concurrency_ceiling_respected() {
        let vms: Vec<_> = (0..12)
            .map(|i| {
                let mut v = vm(&format!("vm-{i}"), &format!("web{i:02}"));
                v.devices.push(disk(2000, "fast"));
                v
            })
            .collect();
        let session = MockSession::with_vms(vms).with_task_delay(Duration::from_millis(5));
        let options = RunOptions {
            threads: 3,
            ..quick()
        };

        let summary = run_simple(&session, &relocate_plan("slow"), &options).unwrap();
        assert_eq!(summary.total().changed, 12);
        assert!(session.peak_in_flight() <= 3);
        assert!(session.peak_in_flight() > 1);
    }
}
