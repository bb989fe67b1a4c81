use super::{
    classify_objects, populate_device_changes, ControllerPool, DeviceLinkedHandler,
    HandlerContext, ParameterHandler,
};
use crate::change_set::ChangeSet;
use crate::objects::{ControllerCategory, Disk, VsphereObject};
use crate::params::DiskParams;
use crate::services::{DeviceTracker, ObjectCache};
use crate::utils::format_size_str_as_kb;
use crate::vsphere::{ConfigSpec, DeviceKind, VirtualDevice};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/*
* Virtual disks, each attached to a controller slot
* given by its device node.
*/
#[derive(Debug)]
pub struct DiskHandler {
    params: Vec<DiskParams>,
    defined_by_user: bool,
    is_new_vm: bool,
    remove_unmanaged: bool,
    detach_only: bool,
    cache: Rc<ObjectCache>,
    controllers: ControllerPool,
    disks: Vec<Rc<Disk>>,
    change_set: ChangeSet,
}

impl DiskHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("disks", ctx.params.disks.is_some(), true)?;
        Ok(Self {
            params: ctx.params.disks.clone().unwrap_or_default(),
            defined_by_user,
            is_new_vm: ctx.is_new_vm(),
            remove_unmanaged: ctx.params.disks_remove_unmanaged,
            detach_only: ctx.params.disks_detach_only,
            cache: ctx.cache.clone(),
            controllers: ctx.controllers.clone(),
            disks: vec![],
            change_set: ctx.new_change_set(),
        })
    }

    fn parse_disk(&self, param: &DiskParams) -> Result<Disk, VmwrightError> {
        if param.datastore.is_some() && param.filename.is_some() {
            return Err(ParameterError::builder()
                .parameter("disks")
                .msg("Only one of datastore or filename can be set for a disk.")
                .details(json!({
                    "device_node": param.device_node,
                    "datastore": param.datastore,
                    "filename": param.filename,
                }))
                .build()
                .into());
        }
        let size_kb = match &param.size {
            Some(size) => Some(format_size_str_as_kb(size).map_err(|e| {
                ParameterError::builder()
                    .parameter("disks")
                    .msg(&e.message)
                    .details(json!({ "device_node": param.device_node, "size": size }))
                    .help(&e.help)
                    .build()
            })?),
            None => None,
        };
        let (controller, unit_number) = self
            .controllers
            .resolve_device_node("disks", &param.device_node)?;
        if controller.category() == ControllerCategory::Usb {
            return Err(ParameterError::builder()
                .parameter("disks")
                .msg(&format!(
                    "Disks cannot be attached to USB controllers, but {} was requested.",
                    param.device_node
                ))
                .details(json!({ "device_node": param.device_node }))
                .build()
                .into());
        }
        let datastore = match &param.datastore {
            Some(name) => Some(self.cache.get_datastore("disks", name)?.name),
            None => None,
        };
        Ok(Disk::builder()
            .controller(controller)
            .unit_number(unit_number)
            .maybe_size_kb(size_kb)
            .maybe_provisioning(param.provisioning)
            .maybe_mode(param.mode)
            .maybe_enable_sharing(param.enable_sharing)
            .maybe_datastore(datastore)
            .maybe_filename(param.filename.clone())
            .build())
    }
}

impl ParameterHandler for DiskHandler {
    fn handler_name(&self) -> &'static str {
        "disks"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if self.is_new_vm && self.params.is_empty() {
            return Err(ParameterError::builder()
                .parameter("disks")
                .msg("At least one disk must be defined when creating a VM.")
                .build()
                .into());
        }
        if !self.disks.is_empty() {
            return Ok(());
        }
        let mut disks = vec![];
        for param in self.params.iter() {
            let disk = self.parse_disk(param)?;
            if let Some(controller) = &disk.controller {
                controller.add_device("disks", disk.unit_number, &disk.name_as_str())?;
            }
            trace!("parsed {}", disk.name_as_str());
            disks.push(Rc::new(disk));
        }
        self.disks = disks;
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        for disk in self.disks.iter() {
            if !disk.has_live_object() && disk.size_kb.is_none() && disk.filename.is_none() {
                return Err(ParameterError::builder()
                    .parameter("disks")
                    .msg(&format!(
                        "{} does not exist yet, a size or a filename is required to create it.",
                        disk.name_as_str()
                    ))
                    .details(json!({ "device": disk.name_as_str() }))
                    .build()
                    .into());
            }
        }
        classify_objects(&mut self.change_set, &self.disks);
        debug!(
            "disks: {} to add, {} to update",
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

impl DeviceLinkedHandler for DiskHandler {
    fn claims_device(&self, device: &VirtualDevice) -> bool {
        matches!(device.kind, DeviceKind::Disk(_))
    }

    /*
     * Disks match on their controller slot.
     * The live disk controller is found through the key of the
     * live controller its desired twin was linked to.
     */
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError> {
        let (controller_key, unit_number) = match &device.kind {
            DeviceKind::Disk(e) => (e.controller_key, e.unit_number),
            _ => return Ok(None),
        };
        let controller = self.controllers.find_by_key(controller_key);
        let live = match Disk::from_live_device(device, controller.clone()) {
            Some(live) => live.detach_only(self.detach_only),
            None => return Ok(None),
        };
        let matching = controller.and_then(|controller| {
            self.disks.iter().find(|e| {
                e.unit_number == unit_number
                    && e.controller
                        .as_ref()
                        .is_some_and(|c| Rc::ptr_eq(c, &controller))
            })
        });
        match matching {
            Some(disk) => {
                disk.link_corresponding_live_object(live)?;
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
    use crate::handlers::ControllerHandler;
    use crate::params::{ScsiControllerParams, VmParams};
    use crate::testing::{context, with_controllers};
    use pretty_assertions::assert_eq;

    fn params(disks: Vec<DiskParams>) -> VmParams {
        VmParams {
            scsi_controllers: Some(vec![ScsiControllerParams {
                bus_number: 0,
                controller_type: "paravirtual".to_owned(),
                bus_sharing: None,
            }]),
            disks: Some(disks),
            ..Default::default()
        }
    }
    fn disk(size: &str, device_node: &str) -> DiskParams {
        DiskParams {
            size: Some(size.to_owned()),
            device_node: device_node.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn creation_requires_a_disk() -> miette::Result<()> {
        let ctx = context(params(vec![]), None);
        let mut handler = DiskHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(err.to_string(), "At least one disk must be defined when creating a VM.");
        Ok(())
    }

    #[test]
    fn creation_requires_disk_group() {
        let ctx = context(VmParams::default(), None);
        let err = DiskHandler::new(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "The disks parameter is mandatory for VM creation");
    }

    #[test]
    fn disk_resolves_device_node() -> miette::Result<()> {
        let ctx = with_controllers(
            context(params(vec![disk("1gb", "SCSI(0:1)")]), None),
            &[ControllerHandler::scsi],
        )?;
        let mut handler = DiskHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        assert_eq!(handler.disks[0].name_as_str(), "Disk - SCSI Controller 0 Unit 1");
        assert_eq!(handler.disks[0].size_kb, Some(1048576));
        Ok(())
    }

    #[test]
    fn unit_conflict() -> miette::Result<()> {
        let ctx = with_controllers(
            context(
                params(vec![disk("1gb", "SCSI(0:1)"), disk("2gb", "SCSI(0:1)")]),
                None,
            ),
            &[ControllerHandler::scsi],
        )?;
        let mut handler = DiskHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add multiple devices with unit number 1 on controller SCSI Controller 0"
        );
        Ok(())
    }

    #[test]
    fn unconfigured_controller() -> miette::Result<()> {
        let ctx = with_controllers(
            context(params(vec![disk("1gb", "SCSI(2:0)")]), None),
            &[ControllerHandler::scsi],
        )?;
        let mut handler = DiskHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(err.parameter_name(), Some("disks"));
        assert_eq!(
            err.details().unwrap()["available_controllers"],
            json!(["SCSI Controller 0"])
        );
        Ok(())
    }

    #[test]
    fn new_disk_needs_size_or_filename() -> miette::Result<()> {
        let ctx = with_controllers(
            context(
                params(vec![DiskParams {
                    device_node: "SCSI(0:0)".to_owned(),
                    ..Default::default()
                }]),
                None,
            ),
            &[ControllerHandler::scsi],
        )?;
        let mut handler = DiskHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        assert!(handler.compare_live_config_with_desired_config().is_err());
        Ok(())
    }
}
