use super::{HandlerContext, ParameterHandler};
use crate::change_set::{ChangeSet, PowerSensitivity};
use crate::params::VmParams;
use crate::services::{DeviceTracker, Placement};
use crate::vsphere::{ConfigSpec, FileInfo};

use std::rc::Rc;

// Error Handling
use log::debug;
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/// Name, guest os and initial file placement.
#[derive(Debug)]
pub struct MetadataHandler {
    params: Rc<VmParams>,
    is_new_vm: bool,
    placement: Rc<Placement>,
    vm_path_name: Option<String>,
    change_set: ChangeSet,
}

impl MetadataHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        Ok(Self {
            params: ctx.params.clone(),
            is_new_vm: ctx.is_new_vm(),
            placement: ctx.placement.clone(),
            vm_path_name: None,
            change_set: ctx.new_change_set(),
        })
    }
}

impl ParameterHandler for MetadataHandler {
    fn handler_name(&self) -> &'static str {
        "metadata"
    }
    fn params_defined_by_user(&self) -> bool {
        self.is_new_vm || self.params.name.is_some() || self.params.guest_id.is_some()
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if !self.is_new_vm {
            return Ok(());
        }
        let required = [
            ("name", self.params.name.is_some()),
            ("guest_id", self.params.guest_id.is_some()),
            ("datacenter", self.params.datacenter.is_some()),
            ("datastore", self.params.datastore.is_some()),
        ];
        for (field, defined) in required {
            if !defined {
                return Err(ParameterError::builder()
                    .parameter(field)
                    .msg(&format!(
                        "{} is a required parameter for VM creation.",
                        field
                    ))
                    .build()
                    .into());
            }
        }
        self.placement.get_creation_target()?;
        self.vm_path_name = self.placement.vm_path_name()?;
        debug!("new vm files at {:?}", self.vm_path_name);
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        self.change_set.check_if_change_is_required(
            "name",
            |p| p.name.clone(),
            |vm| Some(vm.name.clone()),
            PowerSensitivity::Insensitive,
        )?;
        self.change_set.check_if_change_is_required(
            "guest_id",
            |p| p.guest_id.clone(),
            |vm| vm.config.guest_id.clone(),
            PowerSensitivity::Sensitive,
        )?;
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        _tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        spec.name = self.params.name.clone();
        spec.guest_id = self.params.guest_id.clone();
        if self.is_new_vm {
            spec.files = Some(FileInfo {
                vm_path_name: self.vm_path_name.clone(),
            });
            spec.version = self.params.hardware_version.map(|e| format!("vmx-{}", e));
        }
        Ok(())
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
}
