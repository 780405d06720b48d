use crate::Context;
use crate::cli::RemoveIsoArgs;
use anyhow::Result;
use sweep::{Action, Plan};

pub fn run(ctx: &Context, args: RemoveIsoArgs) -> Result<()> {
    let source = args.source_datastore.filter(|ds| !ds.is_empty());
    let rule = args
        .selection
        .rule()
        .source_datastore(source.as_deref())
        .power_state(Some(args.power_state.into()));
    let plan = Plan::new(rule, Action::StripOpticalMedia { source })?;

    super::execute(ctx, "Removing ISO media", &args.connection, &args.run, &plan)
}
