//! One handler per configuration domain.
//!
//! Every handler runs the same phases, in order, across the whole request:
//! verify, link (device linked handlers only), compare, populate.
pub mod cdroms;
pub mod controllers;
pub mod cpu;
pub mod disks;
pub mod memory;
pub mod metadata;
pub mod network_adapters;
pub mod nvdimms;
pub mod vm_options;

// Reexports
pub use cdroms::CdromHandler;
pub use controllers::ControllerHandler;
pub use cpu::CpuHandler;
pub use disks::DiskHandler;
pub use memory::MemoryHandler;
pub use metadata::MetadataHandler;
pub use network_adapters::NetworkAdapterHandler;
pub use nvdimms::NvdimmHandler;
pub use vm_options::VmOptionsHandler;

use crate::change_set::ChangeSet;
use crate::objects::{Controller, ControllerCategory, Linkable, VsphereObject};
use crate::params::VmParams;
use crate::services::{DeviceTracker, ObjectCache, Placement};
use crate::utils::parse_device_node;
use crate::vsphere::{ConfigSpec, LiveVm, VirtualDevice};

use serde_json::json;
use std::fmt;
use std::rc::Rc;

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

pub trait ParameterHandler: fmt::Debug {
    fn handler_name(&self) -> &'static str;
    /// False when the user set none of the parameters this handler governs.
    fn params_defined_by_user(&self) -> bool;

    /// Check the handler's own parameters, without looking at the live vm.
    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError>;
    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError>;
    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError>;

    fn change_set(&self) -> &ChangeSet;

    /// Controllers other handlers may attach devices to.
    fn managed_controllers(&self) -> Vec<Rc<Controller>> {
        vec![]
    }
    fn as_device_linked(&mut self) -> Option<&mut dyn DeviceLinkedHandler> {
        None
    }
}

/*
* Handlers owning desired objects that map to live devices.
*/
pub trait DeviceLinkedHandler {
    /// Whether the live device type is governed by this handler.
    fn claims_device(&self, device: &VirtualDevice) -> bool;
    /*
     * Link a live device to the matching desired object.
     * Returns the live flavored object when nothing matched.
     */
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError>;
    /// Whether unmatched live devices should be removed.
    fn remove_unmanaged(&self) -> bool;
}

/// Every controller parsed by the controller handlers.
#[derive(Debug, Default, Clone)]
pub struct ControllerPool {
    controllers: Vec<Rc<Controller>>,
}

impl ControllerPool {
    pub fn new(controllers: Vec<Rc<Controller>>) -> Self {
        Self { controllers }
    }
    pub fn find(&self, category: ControllerCategory, bus_number: u32) -> Option<Rc<Controller>> {
        self.controllers
            .iter()
            .find(|e| e.category() == category && e.bus_number == bus_number)
            .cloned()
    }
    /// Desired controller linked to the live controller with that key.
    pub fn find_by_key(&self, key: i32) -> Option<Rc<Controller>> {
        self.controllers
            .iter()
            .find(|e| e.has_live_object() && Linkable::key(e.as_ref()) == Some(key))
            .cloned()
    }
    pub fn names(&self) -> Vec<String> {
        self.controllers.iter().map(|e| e.name_as_str()).collect()
    }

    /*
     * Resolve a device node like "SCSI(0:1)" into its controller and unit number.
     * The controller must have been configured by its own handler.
     */
    pub fn resolve_device_node(
        &self,
        parameter: &str,
        device_node: &str,
    ) -> Result<(Rc<Controller>, u32), VmwrightError> {
        let node = parse_device_node(device_node).map_err(|e| {
            ParameterError::builder()
                .parameter(parameter)
                .msg(&e.message)
                .details(json!({ "device_node": device_node }))
                .help(&e.help)
                .build()
        })?;
        match self.find(node.category, node.bus_number) {
            Some(controller) => {
                trace!("{} resolved to {}", node, controller.name_as_str());
                Ok((controller, node.unit_number))
            }
            None => Err(ParameterError::builder()
                .parameter(parameter)
                .msg(&format!(
                    "No controller has been configured for device {}. \
                    You must specify this controller in the appropriate controller parameter.",
                    device_node
                ))
                .details(json!({
                    "device_node": device_node,
                    "available_controllers": self.names(),
                }))
                .build()
                .into()),
        }
    }
}

/// Services and inputs every handler is built from.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub params: Rc<VmParams>,
    pub vm: Option<Rc<LiveVm>>,
    pub cache: Rc<ObjectCache>,
    pub placement: Rc<Placement>,
    pub controllers: ControllerPool,
}

impl HandlerContext {
    pub fn new_change_set(&self) -> ChangeSet {
        ChangeSet::new(self.params.clone(), self.vm.clone())
    }
    pub fn is_new_vm(&self) -> bool {
        self.vm.is_none()
    }

    /*
     * Whether the user set a parameter group.
     * Groups mandatory for creation fail when missing on a new vm.
     */
    pub fn check_params_defined_by_user(
        &self,
        parameter: &str,
        defined: bool,
        required_for_vm_creation: bool,
    ) -> Result<bool, VmwrightError> {
        if !defined && self.is_new_vm() && required_for_vm_creation {
            return Err(ParameterError::builder()
                .parameter(parameter)
                .msg(&format!(
                    "The {} parameter is mandatory for VM creation",
                    parameter
                ))
                .build()
                .into());
        }
        Ok(defined)
    }
}

/*
* Sort desired objects into the change set:
* unlinked ones are added, differing ones updated, the rest in sync.
*/
pub(crate) fn classify_objects<T>(change_set: &mut ChangeSet, objects: &[Rc<T>])
where
    T: VsphereObject + 'static,
{
    for object in objects {
        let object: Rc<dyn VsphereObject> = object.clone();
        if !object.has_live_object() {
            change_set.objects_to_add.push(object);
        } else if object.differs_from_live_object() {
            change_set.objects_to_update.push(object);
        } else {
            change_set.objects_in_sync.push(object);
        }
    }
}

/// Emit creation then edition requests, tracking every device first.
pub(crate) fn populate_device_changes(
    change_set: &ChangeSet,
    spec: &mut ConfigSpec,
    tracker: &mut DeviceTracker,
) -> Result<(), VmwrightError> {
    for object in change_set.objects_to_add.iter() {
        tracker.track_device_id_from_spec(object.clone());
        spec.device_change.push(object.to_new_spec()?);
    }
    for object in change_set.objects_to_update.iter() {
        tracker.track_device_id_from_spec(object.clone());
        spec.device_change.push(object.to_update_spec()?);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::objects::ControllerModel;
    use pretty_assertions::assert_eq;

    fn pool() -> ControllerPool {
        ControllerPool::new(vec![Rc::new(Controller::new(
            0,
            ControllerModel::Scsi {
                controller_type: crate::vsphere::ScsiControllerType::Paravirtual,
                bus_sharing: None,
            },
        ))])
    }

    #[test]
    fn device_node_resolves_to_controller() -> miette::Result<()> {
        let (controller, unit) = pool().resolve_device_node("disks", "SCSI(0:1)")?;
        assert_eq!(controller.name_as_str(), "SCSI Controller 0");
        assert_eq!(unit, 1);
        Ok(())
    }

    #[test]
    fn unknown_controller_lists_available_ones() {
        let err = pool().resolve_device_node("disks", "SCSI(2:0)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No controller has been configured for device SCSI(2:0). \
            You must specify this controller in the appropriate controller parameter."
        );
        assert_eq!(
            err.details().unwrap()["available_controllers"],
            json!(["SCSI Controller 0"])
        );
    }

    #[test]
    fn malformed_device_node_is_a_parameter_error() {
        let err = pool().resolve_device_node("cdroms", "SCSI0:1").unwrap_err();
        assert_eq!(err.parameter_name(), Some("cdroms"));
    }
}
