use super::{
    classify_objects, populate_device_changes, ControllerPool, DeviceLinkedHandler,
    HandlerContext, ParameterHandler,
};
use crate::change_set::ChangeSet;
use crate::objects::{Cdrom, ControllerCategory, VsphereObject};
use crate::params::CdromParams;
use crate::services::DeviceTracker;
use crate::vsphere::{ConfigSpec, DeviceKind, VirtualDevice};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use log::debug;
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/// Cdrom drives, attached to sata or ide controllers.
#[derive(Debug)]
pub struct CdromHandler {
    params: Vec<CdromParams>,
    defined_by_user: bool,
    remove_unmanaged: bool,
    controllers: ControllerPool,
    cdroms: Vec<Rc<Cdrom>>,
    change_set: ChangeSet,
}

impl CdromHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("cdroms", ctx.params.cdroms.is_some(), false)?;
        Ok(Self {
            params: ctx.params.cdroms.clone().unwrap_or_default(),
            defined_by_user,
            remove_unmanaged: ctx.params.cdroms_remove_unmanaged,
            controllers: ctx.controllers.clone(),
            cdroms: vec![],
            change_set: ctx.new_change_set(),
        })
    }

    fn parse_cdrom(&self, param: &CdromParams) -> Result<Cdrom, VmwrightError> {
        if param.iso_media_path.is_some() && param.client_device_mode.is_some() {
            return Err(ParameterError::builder()
                .parameter("cdroms")
                .msg("Only one of iso_media_path or client_device_mode can be set for a CD-ROM.")
                .details(json!({
                    "device_node": param.device_node,
                    "iso_media_path": param.iso_media_path,
                    "client_device_mode": param.client_device_mode,
                }))
                .build()
                .into());
        }
        let (controller, unit_number) = self
            .controllers
            .resolve_device_node("cdroms", &param.device_node)?;
        match controller.category() {
            ControllerCategory::Sata | ControllerCategory::Ide => {}
            category => {
                return Err(ParameterError::builder()
                    .parameter("cdroms")
                    .msg(&format!(
                        "CD-ROMs can only be attached to SATA or IDE controllers, but {} is a {} controller.",
                        param.device_node,
                        category.label()
                    ))
                    .details(json!({ "device_node": param.device_node }))
                    .build()
                    .into())
            }
        }
        Ok(Cdrom::builder()
            .controller(controller)
            .unit_number(unit_number)
            .maybe_iso_media_path(param.iso_media_path.clone())
            .maybe_client_device_mode(param.client_device_mode)
            .maybe_connect_at_power_on(param.connect_at_power_on)
            .build())
    }
}

impl ParameterHandler for CdromHandler {
    fn handler_name(&self) -> &'static str {
        "cdroms"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if !self.cdroms.is_empty() {
            return Ok(());
        }
        let mut cdroms = vec![];
        for param in self.params.iter() {
            let cdrom = self.parse_cdrom(param)?;
            if let Some(controller) = &cdrom.controller {
                controller.add_device("cdroms", cdrom.unit_number, &cdrom.name_as_str())?;
            }
            cdroms.push(Rc::new(cdrom));
        }
        self.cdroms = cdroms;
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        classify_objects(&mut self.change_set, &self.cdroms);
        debug!(
            "cdroms: {} to add, {} to update",
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

impl DeviceLinkedHandler for CdromHandler {
    fn claims_device(&self, device: &VirtualDevice) -> bool {
        matches!(device.kind, DeviceKind::Cdrom(_))
    }
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError> {
        let (controller_key, unit_number) = match &device.kind {
            DeviceKind::Cdrom(e) => (e.controller_key, e.unit_number),
            _ => return Ok(None),
        };
        let controller = self.controllers.find_by_key(controller_key);
        let live = match Cdrom::from_live_device(device, controller.clone()) {
            Some(live) => live,
            None => return Ok(None),
        };
        let matching = controller.and_then(|controller| {
            self.cdroms.iter().find(|e| {
                e.unit_number == unit_number
                    && e.controller
                        .as_ref()
                        .is_some_and(|c| Rc::ptr_eq(c, &controller))
            })
        });
        match matching {
            Some(cdrom) => {
                cdrom.link_corresponding_live_object(live)?;
                Ok(None)
            }
            None => Ok(Some(Rc::new(live))),
        }
    }
    fn remove_unmanaged(&self) -> bool {
        self.remove_unmanaged
    }
}
