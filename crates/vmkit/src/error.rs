//! Error types for management-session operations.
//!
//! Errors separate failures of the session itself (connection, lookups,
//! refused state transitions) from failures reported by a remote task the
//! endpoint accepted and then ran. Callers use that split to decide whether
//! a problem belongs to one VM or to the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to a management endpoint.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be reached or refused the credentials
    #[error("cannot connect to {host}: {message}")]
    Connection {
        /// Host the session was opened against
        host: String,
        /// Reason reported by the backend
        message: String,
    },

    /// No backend knows how to talk to this host
    #[error("unsupported endpoint: {0} (expected file://<inventory.json>)")]
    UnsupportedEndpoint(String),

    /// An inventory object referenced by the caller does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Object kind ("virtual machine", "snapshot", ...)
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A remote task ran and reported failure
    #[error("task {task} failed: {message}")]
    TaskFailed {
        /// Task identifier
        task: String,
        /// Failure reported by the endpoint
        message: String,
    },

    /// The endpoint refused a state transition (e.g. marking a template twice)
    #[error("invalid state for {entity}: {message}")]
    InvalidState {
        /// Name of the entity whose state was wrong
        entity: String,
        /// What was wrong
        message: String,
    },

    /// Inventory document could not be read or written
    #[error("inventory file {path}: {source}")]
    Io {
        /// Path of the inventory document
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Inventory document is not valid JSON for the inventory schema
    #[error("invalid inventory document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
