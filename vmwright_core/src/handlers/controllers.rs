use super::{
    classify_objects, populate_device_changes, DeviceLinkedHandler, HandlerContext,
    ParameterHandler,
};
use crate::change_set::ChangeSet;
use crate::objects::{Controller, ControllerCategory, ControllerModel, VsphereObject};
use crate::services::DeviceTracker;
use crate::vsphere::{ConfigSpec, ScsiControllerType, VirtualDevice};

use serde_json::json;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::str::FromStr;
use strum::IntoEnumIterator;

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/*
* Controllers of a single category.
*
* Scsi, nvme and usb controllers come from a list, sata from a count.
* The two ide controllers exist on every vm: they are always modeled
* so other devices can reference them, and never removed.
*/
#[derive(Debug)]
pub struct ControllerHandler {
    category: ControllerCategory,
    parameter: &'static str,
    defined_by_user: bool,
    remove_unmanaged: bool,
    controllers: Vec<Rc<Controller>>,
    change_set: ChangeSet,
}

impl ControllerHandler {
    fn new(
        ctx: &HandlerContext,
        category: ControllerCategory,
        parameter: &'static str,
        defined: bool,
        controllers: Vec<Rc<Controller>>,
    ) -> Result<Self, VmwrightError> {
        let defined_by_user = ctx.check_params_defined_by_user(parameter, defined, false)?;
        let remove_unmanaged = match category {
            ControllerCategory::Ide => false,
            _ => ctx.params.controllers_remove_unmanaged,
        };
        Ok(Self {
            category,
            parameter,
            defined_by_user,
            remove_unmanaged,
            controllers,
            change_set: ctx.new_change_set(),
        })
    }

    pub fn scsi(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let params = ctx.params.scsi_controllers.clone().unwrap_or_default();
        let mut controllers = vec![];
        for param in params.iter() {
            let controller_type =
                ScsiControllerType::from_str(&param.controller_type).map_err(|_| {
                    ParameterError::builder()
                        .parameter("scsi_controllers")
                        .msg(&format!(
                            "Unsupported SCSI controller type {}",
                            param.controller_type
                        ))
                        .details(json!({
                            "controller_type": param.controller_type,
                            "supported_types": ScsiControllerType::iter()
                                .map(|e| e.to_string())
                                .collect::<Vec<String>>(),
                        }))
                        .build()
                })?;
            controllers.push(Rc::new(Controller::new(
                param.bus_number,
                ControllerModel::Scsi {
                    controller_type,
                    bus_sharing: param.bus_sharing,
                },
            )));
        }
        Self::new(
            ctx,
            ControllerCategory::Scsi,
            "scsi_controllers",
            ctx.params.scsi_controllers.is_some(),
            controllers,
        )
    }

    pub fn sata(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let count = ctx.params.sata_controller_count.unwrap_or_default();
        let controllers = (0..count)
            .map(|bus| Rc::new(Controller::new(bus, ControllerModel::Sata)))
            .collect();
        Self::new(
            ctx,
            ControllerCategory::Sata,
            "sata_controller_count",
            ctx.params.sata_controller_count.is_some(),
            controllers,
        )
    }

    pub fn nvme(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let params = ctx.params.nvme_controllers.clone().unwrap_or_default();
        let controllers = params
            .iter()
            .map(|e| {
                Rc::new(Controller::new(
                    e.bus_number,
                    ControllerModel::Nvme {
                        bus_sharing: e.bus_sharing,
                    },
                ))
            })
            .collect();
        Self::new(
            ctx,
            ControllerCategory::Nvme,
            "nvme_controllers",
            ctx.params.nvme_controllers.is_some(),
            controllers,
        )
    }

    pub fn usb(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let params = ctx.params.usb_controllers.clone().unwrap_or_default();
        let controllers = params
            .iter()
            .map(|e| {
                Rc::new(Controller::new(
                    e.controller_type.bus_number(),
                    ControllerModel::Usb {
                        controller_type: e.controller_type,
                    },
                ))
            })
            .collect();
        Self::new(
            ctx,
            ControllerCategory::Usb,
            "usb_controllers",
            ctx.params.usb_controllers.is_some(),
            controllers,
        )
    }

    pub fn ide(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let controllers = (0..ControllerCategory::Ide.max_count() as u32)
            .map(|bus| Rc::new(Controller::new(bus, ControllerModel::Ide)))
            .collect();
        Self::new(ctx, ControllerCategory::Ide, "ide_controllers", true, controllers)
    }

    pub fn category(&self) -> ControllerCategory {
        self.category
    }
}

impl ParameterHandler for ControllerHandler {
    fn handler_name(&self) -> &'static str {
        match self.category {
            ControllerCategory::Scsi => "scsi_controller",
            ControllerCategory::Sata => "sata_controller",
            ControllerCategory::Nvme => "nvme_controller",
            ControllerCategory::Ide => "ide_controller",
            ControllerCategory::Usb => "usb_controller",
        }
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        let max_count = self.category.max_count();
        let label = self.category.to_string();
        if self.controllers.len() > max_count {
            return Err(ParameterError::builder()
                .parameter(self.parameter)
                .msg(&format!(
                    "Only a maximum of {} {} controllers are allowed, but trying to manage {} controllers.",
                    max_count,
                    label.to_uppercase(),
                    self.controllers.len()
                ))
                .details(json!({
                    "max_count": max_count,
                    "category": label,
                    "current_count": self.controllers.len(),
                }))
                .build()
                .into());
        }
        let mut seen = BTreeSet::new();
        for controller in self.controllers.iter() {
            if controller.bus_number as usize >= max_count {
                return Err(ParameterError::builder()
                    .parameter(self.parameter)
                    .msg(&format!(
                        "Bus number {} is out of range for {} controllers, valid bus numbers are 0 to {}.",
                        controller.bus_number,
                        label.to_uppercase(),
                        max_count - 1
                    ))
                    .details(json!({
                        "bus_number": controller.bus_number,
                        "max_count": max_count,
                    }))
                    .build()
                    .into());
            }
            if !seen.insert(controller.bus_number) {
                return Err(ParameterError::builder()
                    .parameter(self.parameter)
                    .msg(&format!(
                        "{} is defined more than once.",
                        controller.name_as_str()
                    ))
                    .details(json!({ "bus_number": controller.bus_number }))
                    .build()
                    .into());
            }
        }
        trace!("{} {} controllers verified", self.controllers.len(), label);
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        classify_objects(&mut self.change_set, &self.controllers);
        debug!(
            "{}: {} to add, {} to update",
            self.handler_name(),
            self.change_set.objects_to_add.len(),
            self.change_set.objects_to_update.len()
        );
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        populate_device_changes(&self.change_set, spec, tracker)
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
    fn managed_controllers(&self) -> Vec<Rc<Controller>> {
        self.controllers.clone()
    }
    fn as_device_linked(&mut self) -> Option<&mut dyn DeviceLinkedHandler> {
        Some(self)
    }
}

impl DeviceLinkedHandler for ControllerHandler {
    fn claims_device(&self, device: &VirtualDevice) -> bool {
        matches!(ControllerCategory::of_device(device), Some((category, _)) if category == self.category)
    }
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError> {
        let live = match Controller::from_live_device(device) {
            Some(live) => live,
            None => return Ok(None),
        };
        match self
            .controllers
            .iter()
            .find(|e| e.bus_number == live.bus_number)
        {
            Some(controller) => {
                controller.link_corresponding_live_object(live)?;
                Ok(None)
            }
            None => Ok(Some(Rc::new(live))),
        }
    }
    fn remove_unmanaged(&self) -> bool {
        self.remove_unmanaged
    }
}
