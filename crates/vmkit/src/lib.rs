//! # vmkit
//!
//! Inventory model and session interface for virtualization clusters.
//!
//! This crate provides:
//! - The read-mostly inventory view (datacenters, datastores, VMs with their
//!   devices and snapshot trees, resource pools)
//! - The [`Session`] trait every management-endpoint client implements
//! - A scoped [`Connection`] that disconnects when it goes out of scope
//! - An inventory-file backend that serves a JSON document as an endpoint
//!
//! ## Example
//!
//! ```no_run
//! use vmkit::{Credentials, connect};
//!
//! let conn = connect(&Credentials {
//!     host: "file:///srv/lab/inventory.json".into(),
//!     user: "administrator@vsphere.local".into(),
//!     password: String::new(),
//! })
//! .expect("inventory not readable");
//!
//! for dc in conn.list_datacenters().unwrap() {
//!     for vm in conn.list_virtual_machines(&dc).unwrap() {
//!         println!("{}/{} {}", dc.name, vm.folder_path(), vm.name);
//!     }
//! }
//! conn.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod inventory;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use inventory::{DatacenterInventory, Inventory, InventorySession};
pub use session::{Connection, Credentials, Session};
pub use types::{
    Backing, Datacenter, Datastore, Device, DeviceChange, DeviceKind, PowerState, ResourcePool,
    ResourcePoolRef, Snapshot, Task, VirtualMachine, walk_snapshots,
};

use std::path::{Path, PathBuf};

/// Where a session should be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A JSON inventory document
    InventoryFile(PathBuf),
}

impl Endpoint {
    /// Work out which backend serves `host`.
    ///
    /// `file://<path>` and bare paths ending in `.json` name inventory files.
    pub fn parse(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("file://") {
            return Ok(Self::InventoryFile(PathBuf::from(path)));
        }
        if Path::new(host)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            return Ok(Self::InventoryFile(PathBuf::from(host)));
        }
        Err(Error::UnsupportedEndpoint(host.to_string()))
    }
}

/// Open a session for `credentials`.
pub fn connect(credentials: &Credentials) -> Result<Connection> {
    let session: Box<dyn Session> = match Endpoint::parse(&credentials.host)? {
        Endpoint::InventoryFile(path) => {
            Box::new(InventorySession::open(&path, &credentials.user).map_err(|e| {
                match e {
                    Error::Io { source, .. } => Error::Connection {
                        host: credentials.host.clone(),
                        message: source.to_string(),
                    },
                    other => other,
                }
            })?)
        }
    };
    Ok(Connection::new(&credentials.host, session))
}
