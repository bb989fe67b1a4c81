use crate::objects::{to_change_set_output, VsphereObject};
use crate::params::VmParams;
use crate::vsphere::LiveVm;

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::rc::Rc;

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::{PowerCycleError, VmwrightError};

/// How a field reacts to being changed while the vm runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PowerSensitivity {
    /// Can be changed at any time.
    Insensitive,
    /// Needs a power cycle, fails when cycling is not allowed.
    Sensitive,
    /// Needs a power cycle unless the caller finds a live capability that avoids it.
    /// The condition comes back as a PowerCycleError for the caller to inspect.
    Recoverable,
}

/*
* Record of the differences between the desired and the live
* configuration of a vm, for a single handler or for the whole request.
*/
#[derive(Debug)]
pub struct ChangeSet {
    params: Rc<VmParams>,
    vm: Option<Rc<LiveVm>>,
    pub power_cycle_required: bool,
    pub changed_parameters: Map<String, Value>,
    pub objects_to_add: Vec<Rc<dyn VsphereObject>>,
    pub objects_to_update: Vec<Rc<dyn VsphereObject>>,
    pub objects_in_sync: Vec<Rc<dyn VsphereObject>>,
    pub objects_to_remove: Vec<Rc<dyn VsphereObject>>,
}

impl ChangeSet {
    pub fn new(params: Rc<VmParams>, vm: Option<Rc<LiveVm>>) -> Self {
        Self {
            params,
            vm,
            power_cycle_required: false,
            changed_parameters: Map::new(),
            objects_to_add: vec![],
            objects_to_update: vec![],
            objects_in_sync: vec![],
            objects_to_remove: vec![],
        }
    }

    /// A new vm always needs changes.
    pub fn are_changes_required(&self) -> bool {
        if self.vm.is_none() {
            return true;
        }
        !self.changed_parameters.is_empty()
            || !self.objects_to_add.is_empty()
            || !self.objects_to_update.is_empty()
            || !self.objects_to_remove.is_empty()
    }

    /*
     * Compare one field of the request with its live counterpart.
     *
     * Nothing happens for a new vm or when the user did not set the field.
     * A field missing on the live side is a difference.
     * Differences on a running vm are then checked against the field
     * power sensitivity.
     */
    pub fn check_if_change_is_required<T, P, L>(
        &mut self,
        parameter: &str,
        param_value: P,
        live_value: L,
        sensitivity: PowerSensitivity,
    ) -> Result<(), VmwrightError>
    where
        T: PartialEq + Serialize,
        P: FnOnce(&VmParams) -> Option<T>,
        L: FnOnce(&LiveVm) -> Option<T>,
    {
        let vm = match &self.vm {
            Some(vm) => vm.clone(),
            None => return Ok(()),
        };
        let desired = match param_value(&self.params) {
            Some(desired) => desired,
            None => return Ok(()),
        };
        let live = live_value(&vm);
        if live.as_ref() == Some(&desired) {
            trace!("{} is in sync", parameter);
            return Ok(());
        }
        debug!("{} differs from the live vm", parameter);
        self.changed_parameters.insert(
            parameter.to_owned(),
            json!({
                "old_value": live,
                "new_value": desired,
            }),
        );
        if sensitivity == PowerSensitivity::Insensitive || !vm.is_powered_on() {
            return Ok(());
        }
        self.check_power_state_allows_change(parameter, sensitivity)
    }

    fn check_power_state_allows_change(
        &mut self,
        parameter: &str,
        sensitivity: PowerSensitivity,
    ) -> Result<(), VmwrightError> {
        let err = PowerCycleError::builder().parameter(parameter).build();
        match sensitivity {
            PowerSensitivity::Recoverable => Err(err.into()),
            _ if self.params.allow_power_cycling => {
                self.power_cycle_required = true;
                Ok(())
            }
            _ => Err(err.into()),
        }
    }

    /*
     * Settle a recoverable power cycle condition.
     * An enabled live capability avoids the cycle altogether,
     * else the cycle is scheduled when allowed and refused otherwise.
     */
    pub fn recover_power_cycle(
        &mut self,
        capability_enabled: bool,
        err: PowerCycleError,
    ) -> Result<(), VmwrightError> {
        if capability_enabled {
            trace!("{} applied live", err.parameter_name);
            return Ok(());
        }
        if self.params.allow_power_cycling {
            debug!("{} requires a power cycle", err.parameter_name);
            self.power_cycle_required = true;
            return Ok(());
        }
        Err(err.into())
    }

    /// Fold another change set into this one.
    pub fn propagate_required_changes_from(&mut self, other: &ChangeSet) {
        self.power_cycle_required |= other.power_cycle_required;
        for (k, v) in other.changed_parameters.iter() {
            self.changed_parameters.insert(k.to_owned(), v.to_owned());
        }
        self.objects_to_add.extend(other.objects_to_add.iter().cloned());
        self.objects_to_update
            .extend(other.objects_to_update.iter().cloned());
        self.objects_in_sync.extend(other.objects_in_sync.iter().cloned());
        self.objects_to_remove
            .extend(other.objects_to_remove.iter().cloned());
    }

    /*
     * Report of every change the request would make:
     * parameters with their old and new values, added objects as their
     * new value, updated objects as both, removed objects as their old value.
     */
    pub fn changes(&self) -> Value {
        let new_values = |objects: &[Rc<dyn VsphereObject>], side: &str| -> Vec<Value> {
            objects
                .iter()
                .map(|e| to_change_set_output(e.as_ref())[side].to_owned())
                .collect()
        };
        let removed: Vec<Value> = self
            .objects_to_remove
            .iter()
            .map(|e| match e.is_live() {
                true => Value::Object(e.to_module_output()),
                false => to_change_set_output(e.as_ref())["old_value"].to_owned(),
            })
            .collect();
        json!({
            "changed_parameters": self.changed_parameters,
            "objects_to_add": new_values(&self.objects_to_add, "new_value"),
            "objects_to_update": self
                .objects_to_update
                .iter()
                .map(|e| to_change_set_output(e.as_ref()))
                .collect::<Vec<Value>>(),
            "objects_to_remove": removed,
        })
    }
}
