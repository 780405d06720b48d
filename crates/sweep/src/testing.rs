//! Test fixtures: inventory builders and an instrumented session

use crate::context::ProgressCallback;
use crate::rule::Rejection;
use crate::types::{Outcome, Scope, ScopeSummary, WorkItem};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use vmkit::{
    Backing, Datacenter, DatacenterInventory, Datastore, Device, DeviceChange, DeviceKind,
    Error, Inventory, InventorySession, PowerState, ResourcePool, ResourcePoolRef, Session,
    Snapshot, Task, VirtualMachine,
};

pub fn vm(id: &str, name: &str) -> VirtualMachine {
    VirtualMachine {
        id: id.into(),
        name: name.into(),
        folder: "web".into(),
        parent_folder: "prod".into(),
        power_state: PowerState::PoweredOn,
        template: false,
        devices: Vec::new(),
        snapshots: Vec::new(),
    }
}

pub fn template(id: &str, name: &str) -> VirtualMachine {
    VirtualMachine {
        power_state: PowerState::PoweredOff,
        template: true,
        ..vm(id, name)
    }
}

pub fn disk(key: i32, datastore: &str) -> Device {
    Device {
        key,
        label: format!("Hard disk {}", key - 1999),
        kind: DeviceKind::Disk,
        backing: Backing::File {
            datastore: datastore.into(),
            path: format!("vm/disk-{key}.vmdk"),
        },
    }
}

pub fn iso(key: i32, datastore: &str, file: &str) -> Device {
    Device {
        key,
        label: format!("CD/DVD drive {}", key - 2999),
        kind: DeviceKind::OpticalDrive,
        backing: Backing::File {
            datastore: datastore.into(),
            path: format!("iso/{file}"),
        },
    }
}

pub fn snapshot(vm: &str, id: &str, name: &str, children: Vec<Snapshot>) -> Snapshot {
    Snapshot {
        id: id.into(),
        vm: vm.into(),
        name: name.into(),
        description: String::new(),
        created: DateTime::<Utc>::default(),
        state: PowerState::PoweredOn,
        children,
    }
}

fn datastore(name: &str) -> Datastore {
    Datastore {
        id: format!("ds-{name}"),
        name: name.into(),
    }
}

/// One datacenter "dc1" with datastores fast/slow/isos/scratch and a pool tree.
pub fn inventory(vms: Vec<VirtualMachine>) -> Inventory {
    Inventory {
        datacenters: vec![DatacenterInventory {
            id: "dc-1".into(),
            name: "dc1".into(),
            datastores: ["fast", "slow", "isos", "scratch"]
                .into_iter()
                .map(datastore)
                .collect(),
            resource_pool: Some(ResourcePool {
                id: "rp-root".into(),
                name: "Resources".into(),
                children: vec![ResourcePool {
                    id: "rp-web".into(),
                    name: "web".into(),
                    children: Vec::new(),
                }],
            }),
            virtual_machines: vms,
        }],
    }
}

/// Scope of "dc1" with "slow" as destination.
pub fn scope(session: &MockSession) -> Scope {
    Scope {
        datacenter: Datacenter {
            id: "dc-1".into(),
            name: "dc1".into(),
        },
        destination: Some(datastore("slow")),
        pools: session.pools(),
    }
}

const MUTATING: &[&str] = &[
    "relocate",
    "reconfigure",
    "remove_snapshot",
    "remove_all_snapshots",
    "mark_as_template",
    "mark_as_virtual_machine",
];

/// Session over an in-memory inventory that records every call.
///
/// Tasks submitted for VMs named with [`MockSession::fail_tasks_for`] fail
/// without touching the inventory.
pub struct MockSession {
    inner: InventorySession,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing_vms: Mutex<HashSet<String>>,
    failing_restores: Mutex<HashSet<String>>,
    failed_tasks: Mutex<HashSet<String>>,
    next_failed: AtomicUsize,
    task_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockSession {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inner: InventorySession::in_memory(inventory),
            calls: Mutex::new(HashMap::new()),
            failing_vms: Mutex::new(HashSet::new()),
            failing_restores: Mutex::new(HashSet::new()),
            failed_tasks: Mutex::new(HashSet::new()),
            next_failed: AtomicUsize::new(1),
            task_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_vms(vms: Vec<VirtualMachine>) -> Self {
        Self::new(inventory(vms))
    }

    pub fn without_pools(self) -> Self {
        let mut inventory = self.inner.inventory();
        for dc in &mut inventory.datacenters {
            dc.resource_pool = None;
        }
        Self {
            inner: InventorySession::in_memory(inventory),
            ..self
        }
    }

    pub fn with_task_delay(self, delay: Duration) -> Self {
        Self {
            task_delay: delay,
            ..self
        }
    }

    pub fn fail_tasks_for(&self, vm_id: &str) {
        self.failing_vms.lock().unwrap().insert(vm_id.to_string());
    }

    pub fn fail_restore_for(&self, vm_id: &str) {
        self.failing_restores.lock().unwrap().insert(vm_id.to_string());
    }

    pub fn inventory(&self) -> Inventory {
        self.inner.inventory()
    }

    /// Current state of a VM.
    pub fn vm(&self, id: &str) -> VirtualMachine {
        self.inventory()
            .datacenters
            .into_iter()
            .flat_map(|dc| dc.virtual_machines)
            .find(|vm| vm.id == id)
            .unwrap()
    }

    pub fn pools(&self) -> Vec<ResourcePoolRef> {
        self.inventory().datacenters[0]
            .resource_pool
            .as_ref()
            .map(ResourcePool::flatten)
            .unwrap_or_default()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn mutating_calls(&self) -> usize {
        MUTATING.iter().map(|name| self.calls(name)).sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
    }

    fn failing(&self, vm_id: &str) -> Option<Task> {
        if !self.failing_vms.lock().unwrap().contains(vm_id) {
            return None;
        }
        let id = format!(
            "failed-{}",
            self.next_failed.fetch_add(1, Ordering::SeqCst)
        );
        self.failed_tasks.lock().unwrap().insert(id.clone());
        Some(Task {
            id,
            description: format!("injected failure for {vm_id}"),
        })
    }
}

impl Session for MockSession {
    fn list_datacenters(&self) -> vmkit::Result<Vec<Datacenter>> {
        self.record("list_datacenters");
        self.inner.list_datacenters()
    }

    fn list_datastores(&self, datacenter: &Datacenter) -> vmkit::Result<Vec<Datastore>> {
        self.record("list_datastores");
        self.inner.list_datastores(datacenter)
    }

    fn list_virtual_machines(&self, datacenter: &Datacenter) -> vmkit::Result<Vec<VirtualMachine>> {
        self.record("list_virtual_machines");
        self.inner.list_virtual_machines(datacenter)
    }

    fn resource_pool(&self, datacenter: &Datacenter) -> vmkit::Result<Option<ResourcePool>> {
        self.record("resource_pool");
        self.inner.resource_pool(datacenter)
    }

    fn relocate(&self, vm: &VirtualMachine, datastore: &Datastore) -> vmkit::Result<Task> {
        self.record("relocate");
        match self.failing(&vm.id) {
            Some(task) => Ok(task),
            None => self.inner.relocate(vm, datastore),
        }
    }

    fn reconfigure(&self, vm: &VirtualMachine, change: &DeviceChange) -> vmkit::Result<Task> {
        self.record("reconfigure");
        match self.failing(&vm.id) {
            Some(task) => Ok(task),
            None => self.inner.reconfigure(vm, change),
        }
    }

    fn remove_snapshot(&self, snapshot: &Snapshot, remove_children: bool) -> vmkit::Result<Task> {
        self.record("remove_snapshot");
        match self.failing(&snapshot.vm) {
            Some(task) => Ok(task),
            None => self.inner.remove_snapshot(snapshot, remove_children),
        }
    }

    fn remove_all_snapshots(&self, vm: &VirtualMachine) -> vmkit::Result<Task> {
        self.record("remove_all_snapshots");
        match self.failing(&vm.id) {
            Some(task) => Ok(task),
            None => self.inner.remove_all_snapshots(vm),
        }
    }

    fn wait_for_task(&self, task: &Task) -> vmkit::Result<()> {
        self.record("wait_for_task");
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.task_delay.is_zero() {
            thread::sleep(self.task_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failed_tasks.lock().unwrap().remove(&task.id) {
            return Err(Error::TaskFailed {
                task: task.id.clone(),
                message: "injected failure".into(),
            });
        }
        self.inner.wait_for_task(task)
    }

    fn mark_as_template(&self, vm: &VirtualMachine) -> vmkit::Result<()> {
        self.record("mark_as_template");
        if self.failing_restores.lock().unwrap().contains(&vm.id) {
            return Err(Error::InvalidState {
                entity: vm.name.clone(),
                message: "injected failure".into(),
            });
        }
        self.inner.mark_as_template(vm)
    }

    fn mark_as_virtual_machine(&self, vm: &VirtualMachine, pool: &ResourcePoolRef) -> vmkit::Result<()> {
        self.record("mark_as_virtual_machine");
        self.inner.mark_as_virtual_machine(vm, pool)
    }

    fn disconnect(&self) -> vmkit::Result<()> {
        self.record("disconnect");
        self.inner.disconnect()
    }
}

/// Progress callback that keeps a log of reported outcomes.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingProgress {
    fn push(&self, kind: &str, line: String) {
        self.events.lock().unwrap().push((kind.to_string(), line));
    }

    fn lines(&self, kind: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.lines("failed")
    }

    pub fn dry_runs(&self) -> Vec<String> {
        self.lines("dry-run")
    }

    pub fn rejections(&self) -> Vec<String> {
        self.lines("rejected")
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_scope_start(&self, _datacenter: &Datacenter, _vm_count: usize) {}

    fn on_rejected(&self, vm: &VirtualMachine, rejection: &Rejection) {
        self.push("rejected", format!("{}: {}", vm.name, rejection));
    }

    fn on_skipped(&self, vm: &VirtualMachine, reason: &str) {
        self.push("skipped", format!("{}: {}", vm.name, reason));
    }

    fn on_batch_start(&self, _count: usize) {}

    fn on_item_start(&self, _item: &WorkItem) {}

    fn on_item_complete(&self, item: &WorkItem, outcome: &Outcome) {
        match outcome {
            Outcome::Failed { error } => self.push("failed", format!("{}: {}", item.vm.name, error)),
            Outcome::DryRun { changes } => {
                self.push("dry-run", format!("{}: {}", item.vm.name, changes.join(", ")));
            }
            _ => self.push("done", item.vm.name.clone()),
        }
    }

    fn on_batch_complete(&self) {}

    fn on_scope_complete(&self, _summary: &ScopeSummary) {}
}
