use crate::configurator::Configurator;
use crate::params::{VmParams, VmState};
use crate::services::{translate_backend_error, CreationTarget, DeviceTracker, Directory};
use crate::vsphere::{ConfigSpec, LiveVm, PowerState};

use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::rc::Rc;

// Error Handling
use log::{debug, info, warn};
use miette::Result;
use vmwright_error::{BackendError, PowerCycleError, VmwrightError};

/*
* The management api, as seen by the engine.
* Faults come back as BackendError so they can be told apart
* and translated.
*/
pub trait VmBackend {
    fn create_vm(&self, spec: &ConfigSpec, target: &CreationTarget) -> Result<LiveVm, VmwrightError>;
    fn reconfigure(&self, vm: &LiveVm, spec: &ConfigSpec) -> Result<(), VmwrightError>;
    fn power_off(&self, vm: &LiveVm) -> Result<(), VmwrightError>;
    fn power_on(&self, vm: &LiveVm) -> Result<(), VmwrightError>;
    /// Remove the vm and its files.
    fn destroy_vm(&self, vm: &LiveVm) -> Result<(), VmwrightError>;
    /// Remove the vm from the inventory, its files stay on the datastore.
    fn unregister_vm(&self, vm: &LiveVm) -> Result<(), VmwrightError>;
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VmSummary {
    pub moid: Option<String>,
    pub name: Option<String>,
}
impl From<&LiveVm> for VmSummary {
    fn from(vm: &LiveVm) -> Self {
        Self {
            moid: Some(vm.moid.to_owned()),
            name: Some(vm.name.to_owned()),
        }
    }
}

/// Outcome of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VmReport {
    pub changed: bool,
    pub changes: Value,
    pub power_cycled_for_update: bool,
    pub vm: VmSummary,
}
impl VmReport {
    fn new(changed: bool, changes: Value, vm: VmSummary) -> Self {
        Self {
            changed,
            changes,
            power_cycled_for_update: false,
            vm,
        }
    }
}

pub struct VmModule {
    params: VmParams,
    directory: Rc<dyn Directory>,
    backend: Rc<dyn VmBackend>,
    check_mode: bool,
}

impl VmModule {
    pub fn new(params: VmParams, directory: Rc<dyn Directory>, backend: Rc<dyn VmBackend>) -> Self {
        Self {
            params,
            directory,
            backend,
            check_mode: false,
        }
    }
    /// Report what would change without calling the backend.
    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// Bring the vm to the requested state.
    pub fn run(&self, live: Option<LiveVm>) -> Result<VmReport, VmwrightError> {
        match self.params.state {
            VmState::Present => self.ensure_present(live),
            VmState::Absent => self.ensure_absent(live),
        }
    }

    /*
     * Create the vm when there is no live vm, else reconfigure it
     * when anything differs.
     */
    pub fn ensure_present(&self, live: Option<LiveVm>) -> Result<VmReport, VmwrightError> {
        let mut configurator =
            Configurator::new(self.params.clone(), live.clone(), self.directory.clone());
        configurator.prepare_parameter_handlers()?;
        let change_set = configurator.stage_configuration_changes()?;
        let changed = change_set.are_changes_required();
        let power_cycle_required = change_set.power_cycle_required;
        let changes = change_set.changes();

        let vm = match live {
            None if self.check_mode => {
                let summary = VmSummary {
                    moid: None,
                    name: self.params.name.clone(),
                };
                return Ok(VmReport::new(true, changes, summary));
            }
            None => {
                let mut spec = ConfigSpec::default();
                configurator.apply_staged_changes_to_config_spec(&mut spec)?;
                let target = configurator.placement().get_creation_target()?;
                info!(
                    "{} creating vm in {}",
                    "[create]".green(),
                    target.folder.path
                );
                let vm = self
                    .backend
                    .create_vm(&spec, &target)
                    .map_err(|e| translate_backend_error(configurator.tracker(), e))?;
                return Ok(VmReport::new(true, changes, VmSummary::from(&vm)));
            }
            Some(vm) => vm,
        };
        if !changed {
            debug!("vm {} is in sync", vm.name);
            return Ok(VmReport::new(false, changes, VmSummary::from(&vm)));
        }
        if self.check_mode {
            debug!("vm {} would be reconfigured", vm.name);
            return Ok(VmReport::new(true, changes, VmSummary::from(&vm)));
        }

        let mut spec = ConfigSpec::default();
        configurator.apply_staged_changes_to_config_spec(&mut spec)?;
        let power_cycled =
            self.reconfigure(configurator.tracker(), &vm, &spec, power_cycle_required)?;
        Ok(VmReport {
            power_cycled_for_update: power_cycled,
            ..VmReport::new(true, changes, VmSummary::from(&vm))
        })
    }

    /*
     * Remove the vm if it exists, powering it off first.
     * With delete_from_inventory the vm is only unregistered.
     */
    pub fn ensure_absent(&self, live: Option<LiveVm>) -> Result<VmReport, VmwrightError> {
        let vm = match live {
            Some(vm) => vm,
            None => {
                debug!("vm is already absent");
                return Ok(VmReport::new(false, json!({}), VmSummary::default()));
            }
        };
        let report = VmReport::new(true, json!({}), VmSummary::from(&vm));
        if self.check_mode {
            return Ok(report);
        }
        if vm.power_state != PowerState::PoweredOff {
            if !self.params.allow_power_cycling {
                return Err(PowerCycleError::for_power_state("powered off").into());
            }
            info!("{} powering off {}", "[power]".yellow(), vm.name);
            self.backend.power_off(&vm)?;
        }
        match self.params.delete_from_inventory {
            true => {
                info!("{} unregistering {}", "[delete]".red(), vm.name);
                self.backend.unregister_vm(&vm)?;
            }
            false => {
                info!("{} destroying {}", "[delete]".red(), vm.name);
                self.backend.destroy_vm(&vm)?;
            }
        }
        Ok(report)
    }

    /*
     * Submit the request, powering the vm off around it when needed.
     * A reconfiguration refused for the power state is retried once
     * with the vm off, if cycling is allowed.
     * Returns whether the vm was power cycled.
     */
    fn reconfigure(
        &self,
        tracker: &DeviceTracker,
        vm: &LiveVm,
        spec: &ConfigSpec,
        power_cycle_required: bool,
    ) -> Result<bool, VmwrightError> {
        let mut powered_off = false;
        if power_cycle_required && vm.is_powered_on() {
            info!("{} powering off {}", "[power]".yellow(), vm.name);
            self.backend.power_off(vm)?;
            powered_off = true;
        }
        info!("{} reconfiguring {}", "[apply]".green(), vm.name);
        match self.backend.reconfigure(vm, spec) {
            Ok(()) => {}
            Err(VmwrightError::BackendError(BackendError::InvalidPowerState { message }))
                if self.params.allow_power_cycling && !powered_off && vm.is_powered_on() =>
            {
                warn!("reconfiguration refused: {}, retrying powered off", message);
                info!("{} powering off {}", "[power]".yellow(), vm.name);
                self.backend.power_off(vm)?;
                powered_off = true;
                self.backend
                    .reconfigure(vm, spec)
                    .map_err(|e| translate_backend_error(tracker, e))?;
            }
            Err(e) => return Err(translate_backend_error(tracker, e)),
        }
        if powered_off {
            info!("{} powering on {}", "[power]".yellow(), vm.name);
            self.backend.power_on(vm)?;
        }
        Ok(powered_off)
    }
}
