use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use sweep::RuleBuilder;
use vmkit::PowerState;

#[derive(Parser)]
#[command(name = "vmsweep")]
#[command(version)]
#[command(about = "Bulk VM remediation across every datacenter of a cluster", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Move VM storage to another datastore
    Migrate(MigrateArgs),

    /// Eject ISO media from VM optical drives
    RemoveIso(RemoveIsoArgs),

    /// Remove a named snapshot (or all snapshots) from VMs
    RemoveSnapshots(RemoveSnapshotsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Management endpoint (file://path or *.json for an inventory file)
    #[arg(short = 'S', long)]
    pub host: Option<String>,

    /// User name [default: administrator@vsphere.local]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password (prompted for when missing)
    #[arg(short, long, env = "VMSWEEP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Regex matched against VM names
    #[arg(short = 'k', long = "vm")]
    pub vm: Option<String>,

    /// Regex matched against "folder/parentFolder"
    #[arg(short, long)]
    pub folder: Option<String>,

    /// Regex of VM names to leave alone
    #[arg(short = 'x', long)]
    pub exclude: Option<String>,
}

impl SelectionArgs {
    /// Rule builder with the name, folder and exclude patterns applied.
    pub fn rule(&self) -> RuleBuilder {
        sweep::SelectionRule::builder()
            .name(self.vm.as_deref())
            .folder(self.folder.as_deref())
            .exclude(self.exclude.as_deref())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Maximum number of VMs processed at once [default: 1]
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PowerStateArg {
    On,
    Off,
    Suspended,
}

impl From<PowerStateArg> for PowerState {
    fn from(arg: PowerStateArg) -> Self {
        match arg {
            PowerStateArg::On => PowerState::PoweredOn,
            PowerStateArg::Off => PowerState::PoweredOff,
            PowerStateArg::Suspended => PowerState::Suspended,
        }
    }
}

// ============================================================================
// Subcommands
// ============================================================================

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Destination datastore
    #[arg(short = 'd', long = "ds")]
    pub ds: String,

    /// Only VMs with a disk on this datastore
    #[arg(short, long)]
    pub source_datastore: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Required power state
    #[arg(short = 'P', long, value_enum, default_value = "on")]
    pub power_state: PowerStateArg,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct RemoveIsoArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only eject ISOs stored on this datastore
    #[arg(short, long)]
    pub source_datastore: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Required power state
    #[arg(short = 'P', long, value_enum, default_value = "on")]
    pub power_state: PowerStateArg,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct RemoveSnapshotsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only VMs with a disk on this datastore
    #[arg(short = 'd', long)]
    pub datastore: Option<String>,

    /// Snapshot name to remove, with its children (all snapshots when omitted)
    #[arg(short, long)]
    pub snapshot: Option<String>,

    /// Only powered-on VMs
    #[arg(short = 'o', long)]
    pub powered_on: bool,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub run: RunArgs,
}
