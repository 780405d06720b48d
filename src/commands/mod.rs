// Remediation commands
pub mod migrate;
pub mod remove_iso;
pub mod remove_snapshots;

use crate::Context;
use crate::cli::{ConnectionArgs, RunArgs};
use crate::config::Config;
use crate::progress;
use crate::report::{PromptConfirm, Reporter};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use sweep::{Plan, RunOptions};
use vmkit::{Credentials, Endpoint};

/// Connection and run settings after merging flags with the config file.
#[derive(Debug)]
pub struct Settings {
    pub credentials: Credentials,
    pub options: RunOptions,
}

/// Merge command-line flags over the config file.
pub fn resolve(connection: &ConnectionArgs, run: &RunArgs, config: &Config) -> Result<Settings> {
    let host = config
        .host(connection.host.as_deref())
        .context("No host given: pass --host or set [connection] host in config.toml")?;
    let user = config.user(connection.user.as_deref());

    let threads = config.threads(run.threads);
    if threads == 0 {
        bail!("--threads must be at least 1");
    }

    let password = match &connection.password {
        Some(password) => password.clone(),
        None => prompt_password(&host, &user)?,
    };

    Ok(Settings {
        credentials: Credentials {
            host,
            user,
            password,
        },
        options: RunOptions {
            dry_run: run.dry_run,
            threads,
            settle: config.settle(),
        },
    })
}

/// Ask for a password when talking to a live endpoint from a terminal.
fn prompt_password(host: &str, user: &str) -> Result<String> {
    if Endpoint::parse(host).is_ok() || !console::Term::stderr().is_term() {
        return Ok(String::new());
    }
    dialoguer::Password::new()
        .with_prompt(format!("Password for {user}@{host}"))
        .interact()
        .context("Failed to read password")
}

/// Connect, run `plan` over every datacenter, and report.
///
/// Fails when any VM failed, after every VM has been tried.
pub fn execute(
    ctx: &Context,
    title: &str,
    connection: &ConnectionArgs,
    run: &RunArgs,
    plan: &Plan,
) -> Result<()> {
    let config = Config::load()?;
    let settings = resolve(connection, run, &config)?;

    if !ctx.quiet {
        ui::header(title);
        ui::kv("Host", &settings.credentials.host);
        ui::kv("User", &settings.credentials.user);
        ui::kv("Action", &plan.action().to_string());
        ui::kv("Threads", &settings.options.threads.to_string());
        if settings.options.dry_run {
            println!();
            ui::warn("Dry run - no changes will be made");
        }
    }

    let spinner = (!ctx.quiet)
        .then(|| progress::spinner(&format!("Connecting to {}...", settings.credentials.host)));
    let connected = vmkit::connect(&settings.credentials);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let conn = connected
        .with_context(|| format!("Failed to connect to {}", settings.credentials.host))?;

    let reporter = Reporter::new(ctx);
    let mut confirm = PromptConfirm::new(run.yes);
    let summary = sweep::run(&*conn, plan, &settings.options, &reporter, &mut confirm)?;

    conn.close().context("Failed to disconnect")?;
    reporter.print_summary(&summary);

    let total = summary.total();
    if !total.is_success() {
        bail!("{} of {} selected VM(s) failed", total.failed, total.selected);
    }
    Ok(())
}
