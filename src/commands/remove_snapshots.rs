use crate::Context;
use crate::cli::RemoveSnapshotsArgs;
use anyhow::Result;
use sweep::{Action, Plan, SnapshotTarget};
use vmkit::PowerState;

pub fn run(ctx: &Context, args: RemoveSnapshotsArgs) -> Result<()> {
    let target = target(args.snapshot);
    let title = format!("Removing {target}");
    let rule = args
        .selection
        .rule()
        .source_datastore(args.datastore.as_deref())
        .power_state(args.powered_on.then_some(PowerState::PoweredOn));
    let plan = Plan::new(rule, Action::RemoveSnapshots(target))?;

    super::execute(ctx, &title, &args.connection, &args.run, &plan)
}

fn target(name: Option<String>) -> SnapshotTarget {
    name.filter(|n| !n.is_empty())
        .map_or(SnapshotTarget::All, SnapshotTarget::Named)
}
