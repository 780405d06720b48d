//! Inventory entities as seen through a management session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime power state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    /// Running
    PoweredOn,
    /// Stopped
    PoweredOff,
    /// Suspended to disk
    Suspended,
}

impl PowerState {
    /// Endpoint spelling of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of storage-backed virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    /// Virtual disk
    Disk,
    /// Virtual CD/DVD drive
    OpticalDrive,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Disk => write!(f, "disk"),
            DeviceKind::OpticalDrive => write!(f, "optical drive"),
        }
    }
}

/// What a device is backed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Backing {
    /// A file on a datastore: a disk image, or an ISO image for optical drives
    File {
        /// Datastore holding the file
        datastore: String,
        /// Path of the file within the datastore
        path: String,
    },
    /// Drive passed through to the remote console, with no media inserted
    RemotePassthrough,
    /// Nothing attached
    Empty,
}

/// A storage-backed device attached to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device key, unique within its VM
    pub key: i32,
    /// Display label (e.g. "CD/DVD drive 1")
    pub label: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Current backing
    pub backing: Backing,
}

impl Device {
    /// Datastore the device is backed on, if it is file-backed.
    pub fn datastore(&self) -> Option<&str> {
        match &self.backing {
            Backing::File { datastore, .. } => Some(datastore),
            _ => None,
        }
    }

    /// Whether this is an optical drive with an ISO image inserted.
    pub fn has_iso(&self) -> bool {
        self.kind == DeviceKind::OpticalDrive && matches!(self.backing, Backing::File { .. })
    }

    /// Whether the device counts for placement checks of `kind`.
    ///
    /// Optical drives only count while an ISO is inserted; disks always count.
    pub fn is_placed(&self, kind: DeviceKind) -> bool {
        match kind {
            DeviceKind::Disk => self.kind == DeviceKind::Disk,
            DeviceKind::OpticalDrive => self.has_iso(),
        }
    }
}

/// A node in a VM's snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot identifier
    pub id: String,
    /// Identifier of the owning VM
    pub vm: String,
    /// Snapshot name (not unique within a tree)
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Power state of the VM when the snapshot was taken
    pub state: PowerState,
    /// Child snapshots, oldest first
    #[serde(default)]
    pub children: Vec<Snapshot>,
}

impl Snapshot {
    /// Number of snapshots in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Snapshot::subtree_len).sum::<usize>()
    }

    /// One-line description used in listings.
    pub fn summary(&self) -> String {
        let description = if self.description.is_empty() {
            "-"
        } else {
            self.description.as_str()
        };
        format!(
            "{} ({}) created {} [{}]",
            self.name,
            description,
            self.created.format("%Y-%m-%d %H:%M:%S UTC"),
            self.state
        )
    }
}

/// Flatten a snapshot forest in depth-first pre-order.
pub fn walk_snapshots(roots: &[Snapshot]) -> Vec<&Snapshot> {
    let mut out = Vec::new();
    for snapshot in roots {
        out.push(snapshot);
        out.extend(walk_snapshots(&snapshot.children));
    }
    out
}

/// Read-mostly view of a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Name of the folder the VM sits in
    pub folder: String,
    /// Name of that folder's parent
    pub parent_folder: String,
    /// Current power state
    pub power_state: PowerState,
    /// Whether the VM is marked as a template
    #[serde(default)]
    pub template: bool,
    /// Storage-backed devices
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Root snapshots
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
}

impl VirtualMachine {
    /// Composite placement path, `folder/parentFolder`.
    pub fn folder_path(&self) -> String {
        format!("{}/{}", self.folder, self.parent_folder)
    }

    /// Devices that count for placement checks of `kind`.
    pub fn placed_devices(&self, kind: DeviceKind) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.is_placed(kind))
    }

    /// Whether any device of `kind` is backed on `datastore`.
    pub fn is_on_datastore(&self, kind: DeviceKind, datastore: &str) -> bool {
        self.placed_devices(kind)
            .any(|d| d.datastore() == Some(datastore))
    }

    /// Whether the VM has at least one snapshot.
    pub fn has_snapshots(&self) -> bool {
        !self.snapshots.is_empty()
    }
}

/// A datacenter: the scope unit of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacenter {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
}

/// A datastore handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
}

/// A resource pool and its child pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Child pools
    #[serde(default)]
    pub children: Vec<ResourcePool>,
}

/// Reference to a single resource pool, without its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePoolRef {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
}

impl ResourcePool {
    /// Flatten the tree, each pool's descendants before the pool itself.
    ///
    /// The first entry is therefore the first leaf reached by following
    /// first children from the root.
    pub fn flatten(&self) -> Vec<ResourcePoolRef> {
        let mut pools: Vec<ResourcePoolRef> =
            self.children.iter().flat_map(ResourcePool::flatten).collect();
        pools.push(self.to_ref());
        pools
    }

    /// Reference to this pool.
    pub fn to_ref(&self) -> ResourcePoolRef {
        ResourcePoolRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Whether `id` names this pool or one of its descendants.
    pub fn contains(&self, id: &str) -> bool {
        self.id == id || self.children.iter().any(|c| c.contains(id))
    }
}

/// Handle to a remote task submitted to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    /// Task identifier
    pub id: String,
    /// What the task does, for logs
    pub description: String,
}

/// A device reconfiguration sent with `reconfigure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    /// Replace the device with the same key by this one
    Edit(Device),
}
