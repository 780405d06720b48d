use crate::Context;
use crate::cli::MigrateArgs;
use anyhow::Result;
use sweep::{Action, Plan};

pub fn run(ctx: &Context, args: MigrateArgs) -> Result<()> {
    let rule = args
        .selection
        .rule()
        .source_datastore(args.source_datastore.as_deref())
        .power_state(Some(args.power_state.into()));
    let plan = Plan::new(rule, Action::Relocate { destination: args.ds })?;

    super::execute(
        ctx,
        &format!("Migrating VMs to {}", plan.action().destination().unwrap_or_default()),
        &args.connection,
        &args.run,
        &plan,
    )
}
