//! Inventory-file session backend.
//!
//! Serves a JSON inventory document as if it were a live management
//! endpoint. Tasks run when they are submitted and [`Session::wait_for_task`]
//! reports the recorded outcome. Changes are written back to the document
//! on disconnect.
//!
//! The backend enforces the endpoint rules the engine has to respect:
//! templates refuse relocation and reconfiguration, only powered-off
//! runtime VMs can become templates, and only templates can be marked as
//! VMs.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{
    Backing, Datacenter, Datastore, DeviceChange, DeviceKind, PowerState, ResourcePool,
    ResourcePoolRef, Snapshot, Task, VirtualMachine,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// Document
// ============================================================================

/// Root of an inventory document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Datacenters in display order
    #[serde(default)]
    pub datacenters: Vec<DatacenterInventory>,
}

/// Everything the document records about one datacenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterInventory {
    /// Managed object identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Datastores
    #[serde(default)]
    pub datastores: Vec<Datastore>,
    /// Root pool of the first compute resource, if there is one
    #[serde(default)]
    pub resource_pool: Option<ResourcePool>,
    /// Virtual machines and templates
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachine>,
}

impl DatacenterInventory {
    /// Handle for this datacenter.
    pub fn datacenter(&self) -> Datacenter {
        Datacenter {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

impl Inventory {
    /// Read a document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let inventory = serde_json::from_str(&content)?;
        log::debug!("Loaded inventory from {}", path.display());
        Ok(inventory)
    }

    /// Write the document to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Saved inventory to {}", path.display());
        Ok(())
    }

    fn find_datacenter(&self, id: &str) -> Result<&DatacenterInventory> {
        self.datacenters
            .iter()
            .find(|dc| dc.id == id)
            .ok_or_else(|| not_found("datacenter", id))
    }

    /// The VM with `id` together with its datacenter.
    fn locate_vm_mut(
        &mut self,
        id: &str,
    ) -> Result<(&mut VirtualMachine, &[Datastore], Option<&ResourcePool>)> {
        for dc in &mut self.datacenters {
            if let Some(vm) = dc.virtual_machines.iter_mut().find(|vm| vm.id == id) {
                return Ok((vm, &dc.datastores, dc.resource_pool.as_ref()));
            }
        }
        Err(not_found("virtual machine", id))
    }
}

fn not_found(kind: &'static str, id: &str) -> Error {
    Error::NotFound {
        kind,
        id: id.to_string(),
    }
}

// ============================================================================
// Session
// ============================================================================

/// Outcome recorded for a submitted task.
type TaskOutcome = std::result::Result<(), String>;

/// Session over an inventory document.
pub struct InventorySession {
    path: Option<PathBuf>,
    inventory: Mutex<Inventory>,
    tasks: Mutex<HashMap<String, TaskOutcome>>,
    next_task: AtomicU64,
    dirty: AtomicBool,
}

impl InventorySession {
    /// Open the document at `path`; changes are saved back on disconnect.
    pub fn open(path: &Path, user: &str) -> Result<Self> {
        let inventory = Inventory::load(path)?;
        log::info!(
            "Opened inventory {} as {} ({} datacenters)",
            path.display(),
            user,
            inventory.datacenters.len()
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory(inventory)
        })
    }

    /// Serve an in-memory document that is never written anywhere.
    pub fn in_memory(inventory: Inventory) -> Self {
        Self {
            path: None,
            inventory: Mutex::new(inventory),
            tasks: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(1),
            dirty: AtomicBool::new(false),
        }
    }

    /// Copy of the current document.
    pub fn inventory(&self) -> Inventory {
        self.lock_inventory().clone()
    }

    fn lock_inventory(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a task with the outcome of a change that already ran.
    fn submit(&self, description: String, outcome: TaskOutcome) -> Task {
        let id = format!("task-{}", self.next_task.fetch_add(1, Ordering::SeqCst));
        if outcome.is_ok() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        log::debug!("{}: {}", id, description);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), outcome);
        Task { id, description }
    }
}

impl Session for InventorySession {
    fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
        Ok(self
            .lock_inventory()
            .datacenters
            .iter()
            .map(DatacenterInventory::datacenter)
            .collect())
    }

    fn list_datastores(&self, datacenter: &Datacenter) -> Result<Vec<Datastore>> {
        let inventory = self.lock_inventory();
        Ok(inventory.find_datacenter(&datacenter.id)?.datastores.clone())
    }

    fn list_virtual_machines(&self, datacenter: &Datacenter) -> Result<Vec<VirtualMachine>> {
        let inventory = self.lock_inventory();
        Ok(inventory
            .find_datacenter(&datacenter.id)?
            .virtual_machines
            .clone())
    }

    fn resource_pool(&self, datacenter: &Datacenter) -> Result<Option<ResourcePool>> {
        let inventory = self.lock_inventory();
        Ok(inventory.find_datacenter(&datacenter.id)?.resource_pool.clone())
    }

    fn relocate(&self, vm: &VirtualMachine, datastore: &Datastore) -> Result<Task> {
        let mut inventory = self.lock_inventory();
        let (target, datastores, _) = inventory.locate_vm_mut(&vm.id)?;

        let outcome = if target.template {
            Err(format!("{} is a template and cannot be relocated", target.name))
        } else if !datastores.iter().any(|ds| ds.id == datastore.id) {
            Err(format!(
                "datastore {} is not available in the datacenter of {}",
                datastore.name, target.name
            ))
        } else {
            for device in &mut target.devices {
                if device.kind != DeviceKind::Disk {
                    continue;
                }
                if let Backing::File { datastore: ds, .. } = &mut device.backing {
                    ds.clone_from(&datastore.name);
                }
            }
            Ok(())
        };

        Ok(self.submit(
            format!("relocate {} to {}", vm.name, datastore.name),
            outcome,
        ))
    }

    fn reconfigure(&self, vm: &VirtualMachine, change: &DeviceChange) -> Result<Task> {
        let mut inventory = self.lock_inventory();
        let (target, _, _) = inventory.locate_vm_mut(&vm.id)?;

        let DeviceChange::Edit(device) = change;
        let outcome = if target.template {
            Err(format!("{} is a template and cannot be reconfigured", target.name))
        } else if let Some(existing) = target.devices.iter_mut().find(|d| d.key == device.key) {
            *existing = device.clone();
            Ok(())
        } else {
            Err(format!("device {} not found on {}", device.key, target.name))
        };

        Ok(self.submit(
            format!("reconfigure {} device {}", vm.name, device.key),
            outcome,
        ))
    }

    fn remove_snapshot(&self, snapshot: &Snapshot, remove_children: bool) -> Result<Task> {
        let mut inventory = self.lock_inventory();
        let (target, _, _) = inventory.locate_vm_mut(&snapshot.vm)?;

        let outcome = if detach_snapshot(&mut target.snapshots, &snapshot.id, remove_children) {
            Ok(())
        } else {
            Err(format!("snapshot {} not found on {}", snapshot.id, target.name))
        };

        Ok(self.submit(
            format!("remove snapshot {} ({})", snapshot.name, snapshot.id),
            outcome,
        ))
    }

    fn remove_all_snapshots(&self, vm: &VirtualMachine) -> Result<Task> {
        let mut inventory = self.lock_inventory();
        let (target, _, _) = inventory.locate_vm_mut(&vm.id)?;
        target.snapshots.clear();
        Ok(self.submit(format!("remove all snapshots of {}", vm.name), Ok(())))
    }

    fn wait_for_task(&self, task: &Task) -> Result<()> {
        let outcome = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task.id)
            .ok_or_else(|| not_found("task", &task.id))?;

        outcome.map_err(|message| Error::TaskFailed {
            task: task.id.clone(),
            message,
        })
    }

    fn mark_as_template(&self, vm: &VirtualMachine) -> Result<()> {
        let mut inventory = self.lock_inventory();
        let (target, _, _) = inventory.locate_vm_mut(&vm.id)?;

        if target.template {
            return Err(Error::InvalidState {
                entity: target.name.clone(),
                message: "already a template".into(),
            });
        }
        if target.power_state != PowerState::PoweredOff {
            return Err(Error::InvalidState {
                entity: target.name.clone(),
                message: format!("must be powered off, is {}", target.power_state),
            });
        }

        target.template = true;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn mark_as_virtual_machine(&self, vm: &VirtualMachine, pool: &ResourcePoolRef) -> Result<()> {
        let mut inventory = self.lock_inventory();
        let (target, _, pools) = inventory.locate_vm_mut(&vm.id)?;

        if !target.template {
            return Err(Error::InvalidState {
                entity: target.name.clone(),
                message: "not a template".into(),
            });
        }
        if !pools.is_some_and(|root| root.contains(&pool.id)) {
            return Err(not_found("resource pool", &pool.id));
        }

        target.template = false;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        match &self.path {
            Some(path) if self.dirty.swap(false, Ordering::SeqCst) => {
                self.lock_inventory().save(path)
            }
            _ => Ok(()),
        }
    }
}

/// Detach the snapshot `id` from a forest.
///
/// Without `remove_children` the node's children take its place.
fn detach_snapshot(nodes: &mut Vec<Snapshot>, id: &str, remove_children: bool) -> bool {
    if let Some(pos) = nodes.iter().position(|s| s.id == id) {
        let removed = nodes.remove(pos);
        if !remove_children {
            for (offset, child) in removed.children.into_iter().enumerate() {
                nodes.insert(pos + offset, child);
            }
        }
        return true;
    }
    nodes
        .iter_mut()
        .any(|s| detach_snapshot(&mut s.children, id, remove_children))
}
