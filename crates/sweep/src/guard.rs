//! Template guard - run an action on a template by converting it first
//!
//! Templates refuse mutation, so the guard marks the template as a runtime
//! VM, waits for the endpoint to settle, runs the action, and then marks it
//! as a template again. Conversion back is attempted exactly once whatever
//! the action returned, and never retried.

use crate::error::{Result, SweepError};
use crate::types::Outcome;
use std::thread;
use std::time::Duration;
use vmkit::{ResourcePoolRef, Session, VirtualMachine};

/// Converts templates around an action, using the first resource pool.
pub struct TemplateGuard<'a> {
    session: &'a dyn Session,
    pools: &'a [ResourcePoolRef],
    settle: Duration,
}

impl<'a> TemplateGuard<'a> {
    /// Guard for one datacenter's pools, sleeping `settle` after conversion.
    pub fn new(session: &'a dyn Session, pools: &'a [ResourcePoolRef], settle: Duration) -> Self {
        Self {
            session,
            pools,
            settle,
        }
    }

    /// Run `action` against `vm`, converting around it when `vm` is a template.
    pub fn run<F>(&self, vm: &VirtualMachine, action: F) -> Result<Outcome>
    where
        F: FnOnce(&VirtualMachine) -> Result<Outcome>,
    {
        if !vm.template {
            return action(vm);
        }

        let pool = self.pools.first().ok_or_else(|| SweepError::Conversion {
            vm: vm.name.clone(),
            reason: "no resource pool found".into(),
        })?;

        log::info!("{}: converting template to VM in pool {}", vm.name, pool.name);
        self.session
            .mark_as_virtual_machine(vm, pool)
            .map_err(|e| SweepError::Conversion {
                vm: vm.name.clone(),
                reason: e.to_string(),
            })?;

        if !self.settle.is_zero() {
            log::debug!("{}: settling for {:?}", vm.name, self.settle);
            thread::sleep(self.settle);
        }

        let runtime = VirtualMachine {
            template: false,
            ..vm.clone()
        };
        let result = action(&runtime);

        log::info!("{}: converting back to template", vm.name);
        let restored = self.session.mark_as_template(&runtime);

        match (result, restored) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(source)) => Err(SweepError::TemplateRestore {
                vm: vm.name.clone(),
                source,
                action: None,
            }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(source)) => Err(SweepError::TemplateRestore {
                vm: vm.name.clone(),
                source,
                action: Some(Box::new(e)),
            }),
        }
    }
}
