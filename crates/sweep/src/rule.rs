//! Selection rules - decide which VMs a run acts on
//!
//! A [`SelectionRule`] is evaluated against each VM as an ordered chain of
//! checks that stops at the first failure:
//!
//! 1. Placement: destination datastore (disqualifying) and source datastore
//! 2. Power state
//! 3. Folder pattern against `folder/parentFolder`
//! 4. Name pattern
//! 5. Exclude pattern (disqualifies whatever passed before)
//!
//! Patterns are case-insensitive regular expressions searched anywhere in the
//! subject, compiled once when the rule is built.

use crate::error::{Result, SweepError};
use regex::{Regex, RegexBuilder};
use std::fmt;
use vmkit::{DeviceKind, PowerState, VirtualMachine};

/// Why a VM was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A device is already on the destination datastore
    AlreadyOnDestination {
        /// Destination datastore
        datastore: String,
    },
    /// No device is on the required source datastore
    NotOnSource {
        /// Source datastore
        datastore: String,
    },
    /// Power state differs from the required one
    PowerState {
        /// State the rule asks for
        required: PowerState,
        /// State the VM is in
        actual: PowerState,
    },
    /// Folder path does not match the folder pattern
    Folder {
        /// The VM's `folder/parentFolder` path
        path: String,
    },
    /// Name does not match the name pattern
    Name,
    /// Name matches the exclude pattern
    Excluded,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AlreadyOnDestination { datastore } => {
                write!(f, "already on {datastore}")
            }
            Rejection::NotOnSource { datastore } => write!(f, "nothing on {datastore}"),
            Rejection::PowerState { required, actual } => {
                write!(f, "{actual}, want {required}")
            }
            Rejection::Folder { path } => write!(f, "folder {path} does not match"),
            Rejection::Name => write!(f, "name does not match"),
            Rejection::Excluded => write!(f, "excluded"),
        }
    }
}

/// Result of evaluating a rule against one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every check passed
    Selected,
    /// The first check that failed
    Rejected(Rejection),
}

impl Verdict {
    /// Whether the VM is in scope.
    pub fn is_selected(&self) -> bool {
        matches!(self, Verdict::Selected)
    }
}

/// Immutable set of selection criteria for one run.
#[derive(Debug, Clone)]
pub struct SelectionRule {
    folder: Option<Regex>,
    name: Option<Regex>,
    exclude: Option<Regex>,
    source_datastore: Option<String>,
    destination_datastore: Option<String>,
    power_state: Option<PowerState>,
    device_kind: DeviceKind,
}

impl SelectionRule {
    /// Start a rule with no criteria.
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Whether `vm` is in scope.
    pub fn matches(&self, vm: &VirtualMachine) -> bool {
        self.evaluate(vm).is_selected()
    }

    /// Run the check chain and report the first failing check.
    pub fn evaluate(&self, vm: &VirtualMachine) -> Verdict {
        if let Some(rejection) = self.check_placement(vm) {
            return Verdict::Rejected(rejection);
        }

        if let Some(required) = self.power_state
            && vm.power_state != required
        {
            return Verdict::Rejected(Rejection::PowerState {
                required,
                actual: vm.power_state,
            });
        }

        if let Some(folder) = &self.folder {
            let path = vm.folder_path();
            if !folder.is_match(&path) {
                return Verdict::Rejected(Rejection::Folder { path });
            }
        }

        if let Some(name) = &self.name
            && !name.is_match(&vm.name)
        {
            return Verdict::Rejected(Rejection::Name);
        }

        if let Some(exclude) = &self.exclude
            && exclude.is_match(&vm.name)
        {
            return Verdict::Rejected(Rejection::Excluded);
        }

        Verdict::Selected
    }

    fn check_placement(&self, vm: &VirtualMachine) -> Option<Rejection> {
        if let Some(dest) = &self.destination_datastore
            && vm.is_on_datastore(self.device_kind, dest)
        {
            return Some(Rejection::AlreadyOnDestination {
                datastore: dest.clone(),
            });
        }

        if let Some(source) = &self.source_datastore
            && !vm.is_on_datastore(self.device_kind, source)
        {
            return Some(Rejection::NotOnSource {
                datastore: source.clone(),
            });
        }

        None
    }
}

/// Builder for [`SelectionRule`]. Empty patterns count as unset.
#[derive(Debug, Clone, Default)]
pub struct RuleBuilder {
    folder: Option<String>,
    name: Option<String>,
    exclude: Option<String>,
    source_datastore: Option<String>,
    destination_datastore: Option<String>,
    power_state: Option<PowerState>,
    device_kind: Option<DeviceKind>,
}

impl RuleBuilder {
    /// Pattern matched against `folder/parentFolder`.
    pub fn folder(mut self, pattern: Option<&str>) -> Self {
        self.folder = non_empty(pattern);
        self
    }

    /// Pattern the VM name must match.
    pub fn name(mut self, pattern: Option<&str>) -> Self {
        self.name = non_empty(pattern);
        self
    }

    /// Pattern that removes a VM by name.
    pub fn exclude(mut self, pattern: Option<&str>) -> Self {
        self.exclude = non_empty(pattern);
        self
    }

    /// Require a device on this datastore.
    pub fn source_datastore(mut self, datastore: Option<&str>) -> Self {
        self.source_datastore = non_empty(datastore);
        self
    }

    /// Reject VMs with a device already on this datastore.
    pub fn destination_datastore(mut self, datastore: Option<&str>) -> Self {
        self.destination_datastore = non_empty(datastore);
        self
    }

    /// Require this power state.
    pub fn power_state(mut self, state: Option<PowerState>) -> Self {
        self.power_state = state;
        self
    }

    /// Device kind for placement checks (disks unless set).
    pub fn device_kind(mut self, kind: DeviceKind) -> Self {
        self.device_kind = Some(kind);
        self
    }

    /// Compile the patterns.
    pub fn build(self) -> Result<SelectionRule> {
        Ok(SelectionRule {
            folder: compile("folder", self.folder.as_deref())?,
            name: compile("vm", self.name.as_deref())?,
            exclude: compile("exclude", self.exclude.as_deref())?,
            source_datastore: self.source_datastore,
            destination_datastore: self.destination_datastore,
            power_state: self.power_state,
            device_kind: self.device_kind.unwrap_or(DeviceKind::Disk),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn compile(what: &str, pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| SweepError::Configuration(format!("invalid --{what} pattern: {e}")))
        })
        .transpose()
}
