use super::{
    classify_objects, populate_device_changes, DeviceLinkedHandler, HandlerContext,
    ParameterHandler,
};
use crate::change_set::ChangeSet;
use crate::objects::{Nvdimm, NvdimmController, VsphereObject};
use crate::params::NvdimmParams;
use crate::services::DeviceTracker;
use crate::vsphere::{ConfigSpec, DeviceKind, VirtualDevice};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use log::debug;
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/*
* Nvdimm modules and their controller.
* The controller is only modeled when modules are requested.
*/
#[derive(Debug)]
pub struct NvdimmHandler {
    params: Vec<NvdimmParams>,
    defined_by_user: bool,
    remove_unmanaged: bool,
    controller: Option<Rc<NvdimmController>>,
    nvdimms: Vec<Rc<Nvdimm>>,
    live_count: usize,
    change_set: ChangeSet,
}

impl NvdimmHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("nvdimms", ctx.params.nvdimms.is_some(), false)?;
        Ok(Self {
            params: ctx.params.nvdimms.clone().unwrap_or_default(),
            defined_by_user,
            remove_unmanaged: ctx.params.nvdimms_remove_unmanaged,
            controller: None,
            nvdimms: vec![],
            live_count: 0,
            change_set: ctx.new_change_set(),
        })
    }
}

impl ParameterHandler for NvdimmHandler {
    fn handler_name(&self) -> &'static str {
        "nvdimms"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if self.params.is_empty() || self.controller.is_some() {
            return Ok(());
        }
        for (i, param) in self.params.iter().enumerate() {
            if param.size_mb <= 0 {
                return Err(ParameterError::builder()
                    .parameter("nvdimms")
                    .msg("NVDIMM size_mb must be a positive number.")
                    .details(json!({ "index": i + 1, "size_mb": param.size_mb }))
                    .build()
                    .into());
            }
        }
        let controller = Rc::new(NvdimmController::new());
        self.nvdimms = self
            .params
            .iter()
            .enumerate()
            .map(|(i, e)| Rc::new(Nvdimm::new(i + 1, e.size_mb, controller.clone())))
            .collect();
        self.controller = Some(controller);
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        if let Some(controller) = &self.controller {
            let controller: Rc<dyn VsphereObject> = controller.clone();
            match controller.has_live_object() {
                true => self.change_set.objects_in_sync.push(controller),
                false => self.change_set.objects_to_add.push(controller),
            }
        }
        classify_objects(&mut self.change_set, &self.nvdimms);
        debug!(
            "nvdimms: {} to add, {} to update",
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
    fn as_device_linked(&mut self) -> Option<&mut dyn DeviceLinkedHandler> {
        Some(self)
    }
}

impl DeviceLinkedHandler for NvdimmHandler {
    fn claims_device(&self, device: &VirtualDevice) -> bool {
        matches!(
            device.kind,
            DeviceKind::NvdimmController | DeviceKind::Nvdimm(_)
        )
    }
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError> {
        if let Some(live) = NvdimmController::from_live_device(device) {
            return match &self.controller {
                Some(controller) if !controller.has_live_object() => {
                    controller.link_corresponding_live_object(live)?;
                    Ok(None)
                }
                _ => Ok(Some(Rc::new(live))),
            };
        }
        let live = match Nvdimm::from_live_device(device, self.live_count + 1) {
            Some(live) => live,
            None => return Ok(None),
        };
        self.live_count += 1;
        match self.nvdimms.iter().find(|e| !e.has_live_object()) {
            Some(nvdimm) => {
                nvdimm.link_corresponding_live_object(live)?;
                Ok(None)
            }
            None => Ok(Some(Rc::new(live))),
        }
    }
    fn remove_unmanaged(&self) -> bool {
        self.remove_unmanaged
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::VmParams;
    use crate::testing::context;
    use crate::vsphere::VirtualNvdimm;
    use pretty_assertions::assert_eq;

    fn params(sizes: &[i64]) -> VmParams {
        VmParams {
            nvdimms: Some(sizes.iter().map(|e| NvdimmParams { size_mb: *e }).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn controller_is_created_with_modules() -> miette::Result<()> {
        let ctx = context(params(&[1024, 2048]), None);
        let mut handler = NvdimmHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        handler.compare_live_config_with_desired_config()?;
        let names: Vec<String> = handler
            .change_set()
            .objects_to_add
            .iter()
            .map(|e| e.name_as_str())
            .collect();
        assert_eq!(names, vec!["NVDIMM Controller", "NVDIMM 1", "NVDIMM 2"]);
        Ok(())
    }

    #[test]
    fn no_controller_without_modules() -> miette::Result<()> {
        let ctx = context(params(&[]), None);
        let mut handler = NvdimmHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        handler.compare_live_config_with_desired_config()?;
        assert!(handler.change_set().objects_to_add.is_empty());
        Ok(())
    }

    #[test]
    fn live_modules_link_by_position() -> miette::Result<()> {
        let ctx = context(params(&[1024]), None);
        let mut handler = NvdimmHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        let controller = VirtualDevice::new(31000, DeviceKind::NvdimmController);
        let module = |key| {
            VirtualDevice::new(
                key,
                DeviceKind::Nvdimm(VirtualNvdimm {
                    controller_key: 31000,
                    capacity_mb: 1024,
                }),
            )
        };
        assert!(handler.link_vm_device(&controller)?.is_none());
        assert!(handler.link_vm_device(&module(32000))?.is_none());
        let unmanaged = handler.link_vm_device(&module(32001))?.unwrap();
        assert_eq!(unmanaged.name_as_str(), "NVDIMM 2");

        handler.compare_live_config_with_desired_config()?;
        assert!(handler.change_set().objects_to_add.is_empty());
        assert_eq!(handler.change_set().objects_in_sync.len(), 2);
        Ok(())
    }
}
