use super::{compare_attributes_for_changes, output_map, DeviceState, LiveLink, Linkable, VsphereObject};
use crate::vsphere::{
    BusSharing, DeviceChange, DeviceKind, ScsiControllerType, UsbControllerType, VirtualController,
    VirtualDevice, VirtualNvmeController, VirtualScsiController, VirtualUsbController,
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::{DeviceLinkError, LibError, ParameterError, VmwrightError};

#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControllerCategory {
    Scsi,
    Sata,
    Nvme,
    Ide,
    Usb,
}
impl ControllerCategory {
    /// Maximum number of controllers of this category on a single vm.
    pub fn max_count(&self) -> usize {
        match self {
            ControllerCategory::Ide | ControllerCategory::Usb => 2,
            _ => 4,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            ControllerCategory::Scsi => "SCSI",
            ControllerCategory::Sata => "SATA",
            ControllerCategory::Nvme => "NVMe",
            ControllerCategory::Ide => "IDE",
            ControllerCategory::Usb => "USB",
        }
    }
    /// Category and bus of a live controller device.
    pub fn of_device(device: &VirtualDevice) -> Option<(ControllerCategory, u32)> {
        match &device.kind {
            DeviceKind::ScsiController(e) => Some((ControllerCategory::Scsi, e.bus_number)),
            DeviceKind::SataController(e) => Some((ControllerCategory::Sata, e.bus_number)),
            DeviceKind::NvmeController(e) => Some((ControllerCategory::Nvme, e.bus_number)),
            DeviceKind::IdeController(e) => Some((ControllerCategory::Ide, e.bus_number)),
            DeviceKind::UsbController(e) => {
                Some((ControllerCategory::Usb, e.controller_type.bus_number()))
            }
            _ => None,
        }
    }
}

/// Category specific settings of a controller.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ControllerModel {
    Scsi {
        controller_type: ScsiControllerType,
        bus_sharing: Option<BusSharing>,
    },
    Sata,
    Nvme {
        bus_sharing: Option<BusSharing>,
    },
    Ide,
    Usb {
        controller_type: UsbControllerType,
    },
}
impl ControllerModel {
    pub fn category(&self) -> ControllerCategory {
        match self {
            ControllerModel::Scsi { .. } => ControllerCategory::Scsi,
            ControllerModel::Sata => ControllerCategory::Sata,
            ControllerModel::Nvme { .. } => ControllerCategory::Nvme,
            ControllerModel::Ide => ControllerCategory::Ide,
            ControllerModel::Usb { .. } => ControllerCategory::Usb,
        }
    }
    fn bus_sharing(&self) -> Option<BusSharing> {
        match self {
            ControllerModel::Scsi { bus_sharing, .. } | ControllerModel::Nvme { bus_sharing } => {
                *bus_sharing
            }
            _ => None,
        }
    }
}

/*
* A storage or usb controller, identified by its bus number
* within its category.
* Devices attached to it are registered by unit number.
*/
#[derive(Debug)]
pub struct Controller {
    pub bus_number: u32,
    pub model: ControllerModel,
    devices: RefCell<BTreeMap<u32, String>>,
    state: DeviceState,
    live: LiveLink<Controller>,
}

impl Linkable for Controller {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

impl Controller {
    pub fn new(bus_number: u32, model: ControllerModel) -> Self {
        Self {
            bus_number,
            model,
            devices: RefCell::new(BTreeMap::new()),
            state: DeviceState::default(),
            live: LiveLink::default(),
        }
    }
    pub fn from_live_device(device: &VirtualDevice) -> Option<Self> {
        let (bus_number, model) = match &device.kind {
            DeviceKind::ScsiController(e) => (
                e.bus_number,
                ControllerModel::Scsi {
                    controller_type: e.controller_type,
                    bus_sharing: e.bus_sharing,
                },
            ),
            DeviceKind::SataController(e) => (e.bus_number, ControllerModel::Sata),
            DeviceKind::NvmeController(e) => (
                e.bus_number,
                ControllerModel::Nvme {
                    bus_sharing: e.bus_sharing,
                },
            ),
            DeviceKind::IdeController(e) => (e.bus_number, ControllerModel::Ide),
            DeviceKind::UsbController(e) => (
                e.controller_type.bus_number(),
                ControllerModel::Usb {
                    controller_type: e.controller_type,
                },
            ),
            _ => return None,
        };
        let mut controller = Self::new(bus_number, model);
        controller.state = DeviceState::from_raw(device);
        Some(controller)
    }
    pub fn category(&self) -> ControllerCategory {
        self.model.category()
    }
    pub fn key(&self) -> Option<i32> {
        Linkable::key(self)
    }

    /// Register a device at a unit number, refusing a second one at the same unit.
    pub fn add_device(
        &self,
        parameter: &str,
        unit_number: u32,
        device: &str,
    ) -> Result<(), VmwrightError> {
        let mut devices = self.devices.borrow_mut();
        if devices.contains_key(&unit_number) {
            return Err(ParameterError::builder()
                .parameter(parameter)
                .msg(&format!(
                    "Cannot add multiple devices with unit number {} on controller {}",
                    unit_number,
                    self.name_as_str()
                ))
                .details(json!({
                    "unit_number": unit_number,
                    "controller": self.name_as_str(),
                    "device": device,
                }))
                .build()
                .into());
        }
        trace!("attach {} to {} unit {}", device, self.name_as_str(), unit_number);
        devices.insert(unit_number, device.to_owned());
        Ok(())
    }
    pub fn device_count(&self) -> usize {
        self.devices.borrow().len()
    }

    pub fn link_corresponding_live_object(&self, live: Controller) -> Result<(), DeviceLinkError> {
        self.live.link(live, &self.name_as_str())
    }

    fn to_virtual_device(&self, key: i32) -> VirtualDevice {
        let kind = match &self.model {
            ControllerModel::Scsi {
                controller_type,
                bus_sharing,
            } => DeviceKind::ScsiController(VirtualScsiController {
                bus_number: self.bus_number,
                controller_type: *controller_type,
                bus_sharing: Some(bus_sharing.unwrap_or(BusSharing::NoSharing)),
                hot_add_remove: Some(true),
            }),
            ControllerModel::Sata => DeviceKind::SataController(VirtualController {
                bus_number: self.bus_number,
            }),
            ControllerModel::Nvme { bus_sharing } => {
                DeviceKind::NvmeController(VirtualNvmeController {
                    bus_number: self.bus_number,
                    bus_sharing: Some(bus_sharing.unwrap_or(BusSharing::NoSharing)),
                })
            }
            ControllerModel::Ide => DeviceKind::IdeController(VirtualController {
                bus_number: self.bus_number,
            }),
            ControllerModel::Usb { controller_type } => {
                DeviceKind::UsbController(VirtualUsbController {
                    controller_type: *controller_type,
                })
            }
        };
        VirtualDevice::new(key, kind)
    }
}

impl VsphereObject for Controller {
    fn name_as_str(&self) -> String {
        format!("{} Controller {}", self.category().label(), self.bus_number)
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no device key", self.name_as_str()))
                .help("Track the controller before building its creation request")
                .build()
        })?;
        Ok(DeviceChange::add(self.to_virtual_device(key)))
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let mut device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} is not linked to a live device", self.name_as_str()))
                .help("Only linked controllers can be updated")
                .build()
        })?;
        match &mut device.kind {
            DeviceKind::ScsiController(e) => {
                if let ControllerModel::Scsi {
                    controller_type,
                    bus_sharing,
                } = &self.model
                {
                    e.controller_type = *controller_type;
                    if bus_sharing.is_some() {
                        e.bus_sharing = *bus_sharing;
                    }
                }
            }
            DeviceKind::NvmeController(e) => {
                if let Some(bus_sharing) = self.model.bus_sharing() {
                    e.bus_sharing = Some(bus_sharing);
                }
            }
            _ => {}
        }
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no live device to remove", self.name_as_str()))
                .help("Only live controllers can be removed")
                .build()
        })?;
        Ok(DeviceChange::remove(device))
    }
    fn differs_from_live_object(&self) -> bool {
        let live = match self.live.get() {
            Some(live) => live,
            None => return true,
        };
        match (&self.model, &live.model) {
            (
                ControllerModel::Scsi {
                    controller_type,
                    bus_sharing,
                },
                ControllerModel::Scsi {
                    controller_type: live_type,
                    bus_sharing: live_sharing,
                },
            ) => {
                controller_type != live_type
                    || compare_attributes_for_changes(bus_sharing, live_sharing)
            }
            (
                ControllerModel::Nvme { bus_sharing },
                ControllerModel::Nvme {
                    bus_sharing: live_sharing,
                },
            ) => compare_attributes_for_changes(bus_sharing, live_sharing),
            _ => false,
        }
    }
    fn to_module_output(&self) -> Map<String, Value> {
        let controller_type = match &self.model {
            ControllerModel::Scsi {
                controller_type, ..
            } => Some(controller_type.to_string()),
            ControllerModel::Usb { controller_type } => Some(controller_type.to_string()),
            _ => None,
        };
        output_map([
            ("object_type", json!("controller")),
            ("device_type", json!(self.category())),
            ("bus_number", json!(self.bus_number)),
            ("controller_type", json!(controller_type)),
            ("bus_sharing", json!(self.model.bus_sharing())),
            ("label", json!(self.name_as_str())),
        ])
    }
    fn live_module_output(&self) -> Option<Map<String, Value>> {
        self.live.get().map(|e| e.to_module_output())
    }
    fn has_live_object(&self) -> bool {
        self.live.is_linked()
    }
    fn is_live(&self) -> bool {
        self.state.raw.is_some()
    }
    fn assign_placeholder_key(&self, key: i32) {
        if !self.is_live() && !self.has_live_object() {
            self.state.set_placeholder(key);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn live_scsi(bus_sharing: BusSharing) -> VirtualDevice {
        VirtualDevice::new(
            1000,
            DeviceKind::ScsiController(VirtualScsiController {
                bus_number: 0,
                controller_type: ScsiControllerType::Paravirtual,
                bus_sharing: Some(bus_sharing),
                hot_add_remove: Some(true),
            }),
        )
    }

    #[test]
    fn unlinked_controller_differs() {
        let controller = Controller::new(0, ControllerModel::Sata);
        assert!(controller.differs_from_live_object());
    }

    #[test]
    fn linked_controller_in_sync() -> miette::Result<()> {
        let controller = Controller::new(
            0,
            ControllerModel::Scsi {
                controller_type: ScsiControllerType::Paravirtual,
                bus_sharing: None,
            },
        );
        let live = Controller::from_live_device(&live_scsi(BusSharing::PhysicalSharing)).unwrap();
        controller.link_corresponding_live_object(live)?;
        assert!(!controller.differs_from_live_object());
        assert_eq!(controller.key(), Some(1000));
        Ok(())
    }

    #[test]
    fn bus_sharing_change_is_an_update() -> miette::Result<()> {
        let controller = Controller::new(
            0,
            ControllerModel::Scsi {
                controller_type: ScsiControllerType::Paravirtual,
                bus_sharing: Some(BusSharing::VirtualSharing),
            },
        );
        let live = Controller::from_live_device(&live_scsi(BusSharing::NoSharing)).unwrap();
        controller.link_corresponding_live_object(live)?;
        assert!(controller.differs_from_live_object());
        let change = controller.to_update_spec()?;
        match change.device.kind {
            DeviceKind::ScsiController(e) => {
                assert_eq!(e.bus_sharing, Some(BusSharing::VirtualSharing))
            }
            _ => panic!("expected a scsi controller"),
        }
        Ok(())
    }

    #[test]
    fn unit_numbers_are_unique() -> miette::Result<()> {
        let controller = Controller::new(1, ControllerModel::Sata);
        controller.add_device("disks", 0, "Disk - SATA Controller 1 Unit 0")?;
        let err = controller
            .add_device("cdroms", 0, "CD-ROM - SATA Controller 1 Unit 0")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add multiple devices with unit number 0 on controller SATA Controller 1"
        );
        assert_eq!(controller.device_count(), 1);
        Ok(())
    }

    #[test]
    fn new_spec_uses_placeholder() -> miette::Result<()> {
        let controller = Controller::new(
            1,
            ControllerModel::Nvme { bus_sharing: None },
        );
        assert!(controller.to_new_spec().is_err());
        controller.assign_placeholder_key(-3);
        let change = controller.to_new_spec()?;
        assert_eq!(change.device.key, -3);
        assert_eq!(
            change.device.kind,
            DeviceKind::NvmeController(VirtualNvmeController {
                bus_number: 1,
                bus_sharing: Some(BusSharing::NoSharing),
            })
        );
        Ok(())
    }
}
