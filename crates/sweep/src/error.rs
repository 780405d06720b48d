//! Error taxonomy for sweep runs.
//!
//! Errors are scoped: [`SweepError::is_fatal`] separates the ones that abort
//! the whole run from the ones that only fail a single work item.

use thiserror::Error;

/// Errors raised while selecting or remediating VMs.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Invalid rule or missing run-wide prerequisite (e.g. destination datastore)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inventory enumeration failed
    #[error("inventory error: {0}")]
    Inventory(#[source] vmkit::Error),

    /// A template could not be converted to a runtime VM
    #[error("cannot convert template {vm} to a virtual machine: {reason}")]
    Conversion {
        /// VM name
        vm: String,
        /// Why the conversion failed
        reason: String,
    },

    /// Named snapshot removal matched more than one snapshot
    #[error("{vm}: {count} snapshots are named '{name}', refusing to guess")]
    AmbiguousSnapshot {
        /// VM name
        vm: String,
        /// Requested snapshot name
        name: String,
        /// Number of matches
        count: usize,
    },

    /// A remote relocate/reconfigure/snapshot call failed
    #[error("{vm}: {source}")]
    RemoteTask {
        /// VM name
        vm: String,
        /// Error reported by the session
        #[source]
        source: vmkit::Error,
    },

    /// The operator could not be asked for confirmation
    #[error("confirmation failed: {0}")]
    Prompt(#[from] std::io::Error),

    /// The VM could not be marked as a template again after the action
    #[error("{vm} was left as a virtual machine: {source}{}", action_note(.action.as_deref()))]
    TemplateRestore {
        /// VM name
        vm: String,
        /// Error reported by the session
        #[source]
        source: vmkit::Error,
        /// The action's own error, when it failed too
        action: Option<Box<SweepError>>,
    },
}

fn action_note(action: Option<&SweepError>) -> String {
    action.map_or_else(String::new, |e| format!(" (action failed: {e})"))
}

impl SweepError {
    /// Whether the error aborts the whole run rather than one work item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Inventory(_) | Self::Prompt(_)
        )
    }

    /// Wrap a session error raised while acting on `vm`.
    pub fn remote(vm: &str, source: vmkit::Error) -> Self {
        Self::RemoteTask {
            vm: vm.to_string(),
            source,
        }
    }
}

impl From<vmkit::Error> for SweepError {
    fn from(e: vmkit::Error) -> Self {
        Self::Inventory(e)
    }
}

/// Result type for sweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SweepError::Configuration("missing datastore".into()).is_fatal());
        assert!(
            SweepError::Inventory(vmkit::Error::UnsupportedEndpoint("x".into())).is_fatal()
        );
        assert!(
            !SweepError::Conversion {
                vm: "tmpl01".into(),
                reason: "no resource pool".into(),
            }
            .is_fatal()
        );
        assert!(
            !SweepError::AmbiguousSnapshot {
                vm: "db01".into(),
                name: "pre-upgrade".into(),
                count: 2,
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_template_restore_mentions_action_failure() {
        let restore = || vmkit::Error::InvalidState {
            entity: "tmpl01".into(),
            message: "not powered off".into(),
        };
        let err = SweepError::TemplateRestore {
            vm: "tmpl01".into(),
            source: restore(),
            action: None,
        };
        assert_eq!(
            err.to_string(),
            "tmpl01 was left as a virtual machine: invalid state for tmpl01: not powered off"
        );

        let err = SweepError::TemplateRestore {
            vm: "tmpl01".into(),
            source: restore(),
            action: Some(Box::new(SweepError::Configuration("boom".into()))),
        };
        assert!(err.to_string().ends_with("(action failed: configuration error: boom)"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_remote_wraps_vm_name() {
        let err = SweepError::remote(
            "web01",
            vmkit::Error::TaskFailed {
                task: "task-7".into(),
                message: "disk locked".into(),
            },
        );
        assert_eq!(err.to_string(), "web01: task task-7 failed: disk locked");
        assert!(!err.is_fatal());
    }
}
