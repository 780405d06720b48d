//! Remediation actions applied to one VM

use crate::error::{Result, SweepError};
use crate::types::{Outcome, Scope};
use std::fmt;
use vmkit::{Backing, DeviceChange, DeviceKind, Session, Snapshot, VirtualMachine, walk_snapshots};

/// Which snapshots to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotTarget {
    /// The single snapshot with this exact name, with its descendants
    Named(String),
    /// Every snapshot of the VM
    All,
}

impl fmt::Display for SnapshotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotTarget::Named(name) => write!(f, "snapshot '{name}'"),
            SnapshotTarget::All => write!(f, "all snapshots"),
        }
    }
}

/// What a run does to each selected VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Move the VM's storage to a datastore
    Relocate {
        /// Datastore name
        destination: String,
    },
    /// Eject ISO media, optionally only ISOs on one datastore
    StripOpticalMedia {
        /// Only eject ISOs stored on this datastore
        source: Option<String>,
    },
    /// Delete snapshots
    RemoveSnapshots(SnapshotTarget),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Relocate { destination } => write!(f, "relocate to {destination}"),
            Action::StripOpticalMedia { source: Some(ds) } => {
                write!(f, "remove ISO media on {ds}")
            }
            Action::StripOpticalMedia { source: None } => write!(f, "remove ISO media"),
            Action::RemoveSnapshots(target) => write!(f, "remove {target}"),
        }
    }
}

impl Action {
    /// Past-tense verb for reports.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Relocate { .. } => "migrated",
            Action::StripOpticalMedia { .. } => "media removed",
            Action::RemoveSnapshots(_) => "snapshots removed",
        }
    }

    /// Device kind the selection rule checks placement against.
    pub fn placement_kind(&self) -> DeviceKind {
        match self {
            Action::StripOpticalMedia { .. } => DeviceKind::OpticalDrive,
            Action::Relocate { .. } | Action::RemoveSnapshots(_) => DeviceKind::Disk,
        }
    }

    /// Destination datastore name, for actions that move storage.
    pub fn destination(&self) -> Option<&str> {
        match self {
            Action::Relocate { destination } => Some(destination),
            _ => None,
        }
    }

    /// Describe what executing the action on `vm` would change.
    ///
    /// An empty list means there is nothing to do.
    pub fn pending_changes(&self, vm: &VirtualMachine) -> Result<Vec<String>> {
        match self {
            Action::Relocate { destination } => Ok(vec![format!("relocate to {destination}")]),
            Action::StripOpticalMedia { source } => Ok(vm
                .devices
                .iter()
                .filter(|d| ejectable(d, source.as_deref()))
                .map(|d| match &d.backing {
                    Backing::File { datastore, path } => {
                        format!("eject [{datastore}] {path} from {}", d.label)
                    }
                    _ => format!("eject media from {}", d.label),
                })
                .collect()),
            Action::RemoveSnapshots(SnapshotTarget::All) => Ok(walk_snapshots(&vm.snapshots)
                .into_iter()
                .map(|s| format!("remove {}", s.summary()))
                .collect()),
            Action::RemoveSnapshots(SnapshotTarget::Named(name)) => {
                let target = single_named(vm, name)?;
                Ok(target
                    .map(|node| {
                        walk_snapshots(std::slice::from_ref(node))
                            .into_iter()
                            .map(|s| format!("remove {}", s.summary()))
                            .collect()
                    })
                    .unwrap_or_default())
            }
        }
    }

    /// Run the action against a runtime VM, awaiting every task.
    pub fn execute(
        &self,
        session: &dyn Session,
        vm: &VirtualMachine,
        scope: &Scope,
    ) -> Result<Outcome> {
        match self {
            Action::Relocate { destination } => {
                let datastore = scope.destination.as_ref().ok_or_else(|| {
                    SweepError::Configuration(format!(
                        "datastore {destination} not resolved in {}",
                        scope.datacenter.name
                    ))
                })?;
                let task = session
                    .relocate(vm, datastore)
                    .map_err(|e| SweepError::remote(&vm.name, e))?;
                log::debug!("{}: waiting for {}", vm.name, task.id);
                session
                    .wait_for_task(&task)
                    .map_err(|e| SweepError::remote(&vm.name, e))?;
                Ok(Outcome::Relocated {
                    datastore: datastore.name.clone(),
                })
            }
            Action::StripOpticalMedia { source } => strip_media(session, vm, source.as_deref()),
            Action::RemoveSnapshots(target) => remove_snapshots(session, vm, target),
        }
    }
}

fn ejectable(device: &vmkit::Device, source: Option<&str>) -> bool {
    device.has_iso() && source.is_none_or(|ds| device.datastore() == Some(ds))
}

fn strip_media(
    session: &dyn Session,
    vm: &VirtualMachine,
    source: Option<&str>,
) -> Result<Outcome> {
    let mut drives = 0;
    for device in vm.devices.iter().filter(|d| ejectable(d, source)) {
        let mut edited = device.clone();
        edited.backing = Backing::RemotePassthrough;

        let task = session
            .reconfigure(vm, &DeviceChange::Edit(edited))
            .map_err(|e| SweepError::remote(&vm.name, e))?;
        session
            .wait_for_task(&task)
            .map_err(|e| SweepError::remote(&vm.name, e))?;
        log::info!("{}: ejected media from {}", vm.name, device.label);
        drives += 1;
    }

    if drives == 0 {
        return Ok(Outcome::NoChange {
            reason: "no ISO media inserted".into(),
        });
    }
    Ok(Outcome::MediaRemoved { drives })
}

fn remove_snapshots(
    session: &dyn Session,
    vm: &VirtualMachine,
    target: &SnapshotTarget,
) -> Result<Outcome> {
    match target {
        SnapshotTarget::All => {
            if !vm.has_snapshots() {
                return Ok(Outcome::NoChange {
                    reason: "no snapshots".into(),
                });
            }
            let count = walk_snapshots(&vm.snapshots).len();
            let task = session
                .remove_all_snapshots(vm)
                .map_err(|e| SweepError::remote(&vm.name, e))?;
            session
                .wait_for_task(&task)
                .map_err(|e| SweepError::remote(&vm.name, e))?;
            Ok(Outcome::SnapshotsRemoved { count })
        }
        SnapshotTarget::Named(name) => {
            let Some(node) = single_named(vm, name)? else {
                return Ok(Outcome::NoChange {
                    reason: format!("no snapshot named '{name}'"),
                });
            };
            let task = session
                .remove_snapshot(node, true)
                .map_err(|e| SweepError::remote(&vm.name, e))?;
            session
                .wait_for_task(&task)
                .map_err(|e| SweepError::remote(&vm.name, e))?;
            Ok(Outcome::SnapshotsRemoved {
                count: node.subtree_len(),
            })
        }
    }
}

/// The only snapshot named `name`, or an ambiguity error.
fn single_named<'a>(vm: &'a VirtualMachine, name: &str) -> Result<Option<&'a Snapshot>> {
    let mut found = Vec::new();
    find_snapshots_by_name(&vm.snapshots, name, &mut found);
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(SweepError::AmbiguousSnapshot {
            vm: vm.name.clone(),
            name: name.to_string(),
            count,
        }),
    }
}

/// Depth-first search; a matched node's subtree is not searched.
fn find_snapshots_by_name<'a>(nodes: &'a [Snapshot], name: &str, found: &mut Vec<&'a Snapshot>) {
    for node in nodes {
        if node.name == name {
            found.push(node);
        } else {
            find_snapshots_by_name(&node.children, name, found);
        }
    }
}
