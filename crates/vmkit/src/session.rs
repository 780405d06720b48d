//! Session abstraction for management endpoints.
//!
//! The [`Session`] trait is the only way the rest of the workspace talks to a
//! cluster, allowing for different implementations (inventory file, live
//! endpoint client, mocks for testing).

use crate::error::Result;
use crate::types::{
    Datacenter, Datastore, DeviceChange, ResourcePool, ResourcePoolRef, Snapshot, Task,
    VirtualMachine,
};
use std::fmt;
use std::ops::Deref;

/// Login details for a management endpoint.
#[derive(Clone)]
pub struct Credentials {
    /// Endpoint host or inventory location
    pub host: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An open session with a management endpoint.
///
/// Implementations must be safe to call from several worker threads at once;
/// a backend without internal concurrency serializes around each call.
/// Mutating calls return a [`Task`] that must be awaited with
/// [`Session::wait_for_task`] before its effect is known.
pub trait Session: Send + Sync {
    /// List every datacenter visible to the session.
    fn list_datacenters(&self) -> Result<Vec<Datacenter>>;

    /// List the datastores of a datacenter.
    fn list_datastores(&self, datacenter: &Datacenter) -> Result<Vec<Datastore>>;

    /// List every virtual machine (templates included) of a datacenter.
    fn list_virtual_machines(&self, datacenter: &Datacenter) -> Result<Vec<VirtualMachine>>;

    /// Root resource pool of the datacenter's first compute resource.
    fn resource_pool(&self, datacenter: &Datacenter) -> Result<Option<ResourcePool>>;

    /// Move the VM's storage to `datastore`.
    fn relocate(&self, vm: &VirtualMachine, datastore: &Datastore) -> Result<Task>;

    /// Apply a device change to the VM.
    fn reconfigure(&self, vm: &VirtualMachine, change: &DeviceChange) -> Result<Task>;

    /// Remove one snapshot, optionally with its whole subtree.
    fn remove_snapshot(&self, snapshot: &Snapshot, remove_children: bool) -> Result<Task>;

    /// Remove every snapshot of the VM.
    fn remove_all_snapshots(&self, vm: &VirtualMachine) -> Result<Task>;

    /// Block until `task` finishes; errors if the task reported failure.
    fn wait_for_task(&self, task: &Task) -> Result<()>;

    /// Mark a runtime VM as a template.
    fn mark_as_template(&self, vm: &VirtualMachine) -> Result<()>;

    /// Mark a template as a runtime VM attached to `pool`.
    fn mark_as_virtual_machine(&self, vm: &VirtualMachine, pool: &ResourcePoolRef) -> Result<()>;

    /// End the session.
    fn disconnect(&self) -> Result<()>;
}

/// Scoped ownership of a session: disconnects when dropped.
pub struct Connection {
    host: String,
    session: Box<dyn Session>,
    closed: bool,
}

impl Connection {
    /// Wrap an already open session.
    pub fn new(host: impl Into<String>, session: Box<dyn Session>) -> Self {
        Self {
            host: host.into(),
            session,
            closed: false,
        }
    }

    /// Host the session belongs to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Disconnect now and report any error, instead of logging it on drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        log::debug!("Disconnecting from {}", self.host);
        self.session.disconnect()
    }
}

impl Deref for Connection {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.session.disconnect() {
            log::warn!("Failed to disconnect from {}: {}", self.host, e);
        }
    }
}
