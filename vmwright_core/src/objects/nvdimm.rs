use super::{
    compare_attributes_for_changes, output_map, DeviceState, LiveLink, Linkable, VsphereObject,
};
use crate::vsphere::{DeviceChange, DeviceKind, FileOperation, VirtualDevice, VirtualNvdimm};

use serde_json::{json, Map, Value};
use std::rc::Rc;

// Error Handling
use miette::Result;
use vmwright_error::{LibError, VmwrightError};

/*
* The single controller every nvdimm hangs off.
* It has no settings: once it exists there is nothing to update.
*/
#[derive(Debug, Default)]
pub struct NvdimmController {
    state: DeviceState,
    live: LiveLink<NvdimmController>,
}

impl Linkable for NvdimmController {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

impl NvdimmController {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_live_device(device: &VirtualDevice) -> Option<Self> {
        match device.kind {
            DeviceKind::NvdimmController => Some(Self {
                state: DeviceState::from_raw(device),
                live: LiveLink::default(),
            }),
            _ => None,
        }
    }
    pub fn key(&self) -> Option<i32> {
        Linkable::key(self)
    }
    pub fn link_corresponding_live_object(
        &self,
        live: NvdimmController,
    ) -> Result<(), VmwrightError> {
        self.live.link(live, &self.name_as_str())?;
        Ok(())
    }
}

impl VsphereObject for NvdimmController {
    fn name_as_str(&self) -> String {
        "NVDIMM Controller".to_owned()
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg("NVDIMM Controller has no device key")
                .help("Track the controller before building its creation request")
                .build()
        })?;
        Ok(DeviceChange::add(VirtualDevice::new(
            key,
            DeviceKind::NvdimmController,
        )))
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg("NVDIMM Controller is not linked to a live device")
                .help("Only linked controllers can be updated")
                .build()
        })?;
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg("NVDIMM Controller has no live device to remove")
                .help("Only live controllers can be removed")
                .build()
        })?;
        Ok(DeviceChange::remove(device))
    }
    fn differs_from_live_object(&self) -> bool {
        !self.live.is_linked()
    }
    fn to_module_output(&self) -> Map<String, Value> {
        output_map([
            ("object_type", json!("nvdimm_controller")),
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

/// A non volatile memory module, identified by its position.
#[derive(Debug)]
pub struct Nvdimm {
    /// 1-based position among the vm nvdimms.
    pub index: usize,
    pub size_mb: Option<i64>,
    pub controller: Option<Rc<NvdimmController>>,
    state: DeviceState,
    live: LiveLink<Nvdimm>,
}

impl Linkable for Nvdimm {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

impl Nvdimm {
    pub fn new(index: usize, size_mb: i64, controller: Rc<NvdimmController>) -> Self {
        Self {
            index,
            size_mb: Some(size_mb),
            controller: Some(controller),
            state: DeviceState::default(),
            live: LiveLink::default(),
        }
    }
    pub fn from_live_device(device: &VirtualDevice, index: usize) -> Option<Self> {
        match &device.kind {
            DeviceKind::Nvdimm(nvdimm) => Some(Self {
                index,
                size_mb: Some(nvdimm.capacity_mb),
                controller: None,
                state: DeviceState::from_raw(device),
                live: LiveLink::default(),
            }),
            _ => None,
        }
    }
    pub fn link_corresponding_live_object(&self, live: Nvdimm) -> Result<(), VmwrightError> {
        self.live.link(live, &self.name_as_str())?;
        Ok(())
    }
}

impl VsphereObject for Nvdimm {
    fn name_as_str(&self) -> String {
        format!("NVDIMM {}", self.index)
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no device key", self.name_as_str()))
                .help("Track the nvdimm before building its creation request")
                .build()
        })?;
        let controller_key = self
            .controller
            .as_ref()
            .and_then(|e| e.key())
            .ok_or_else(|| {
                LibError::builder()
                    .msg("NVDIMM Controller has no key yet")
                    .help("The controller must be added to the request before its nvdimms")
                    .build()
            })?;
        let device = VirtualDevice::new(
            key,
            DeviceKind::Nvdimm(VirtualNvdimm {
                controller_key,
                capacity_mb: self.size_mb.unwrap_or_default(),
            }),
        )
        .with_label(&self.name_as_str());
        Ok(DeviceChange::add(device).with_file_operation(FileOperation::Create))
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let mut device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no live device to edit", self.name_as_str()))
                .help("Only nvdimms linked to a live device can be edited")
                .build()
        })?;
        if let (DeviceKind::Nvdimm(nvdimm), Some(size)) = (&mut device.kind, self.size_mb) {
            nvdimm.capacity_mb = size;
        }
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self.raw_device().cloned().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no live device to remove", self.name_as_str()))
                .help("Only live nvdimms can be removed")
                .build()
        })?;
        Ok(DeviceChange::remove(device).with_file_operation(FileOperation::Destroy))
    }
    fn differs_from_live_object(&self) -> bool {
        match self.live.get() {
            Some(live) => compare_attributes_for_changes(&self.size_mb, &live.size_mb),
            None => true,
        }
    }
    fn to_module_output(&self) -> Map<String, Value> {
        output_map([
            ("object_type", json!("nvdimm")),
            ("label", json!(self.name_as_str())),
            ("size_mb", json!(self.size_mb)),
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

    #[test]
    fn controller_never_differs_once_linked() -> miette::Result<()> {
        let controller = NvdimmController::new();
        assert!(controller.differs_from_live_object());
        let live = VirtualDevice::new(14000, DeviceKind::NvdimmController);
        controller.link_corresponding_live_object(
            NvdimmController::from_live_device(&live).unwrap(),
        )?;
        assert!(!controller.differs_from_live_object());
        assert_eq!(controller.key(), Some(14000));
        Ok(())
    }

    #[test]
    fn nvdimm_growth_is_an_update() -> miette::Result<()> {
        let controller = Rc::new(NvdimmController::new());
        let nvdimm = Nvdimm::new(1, 2048, controller);
        let live = VirtualDevice::new(
            14100,
            DeviceKind::Nvdimm(VirtualNvdimm {
                controller_key: 14000,
                capacity_mb: 1024,
            }),
        );
        nvdimm.link_corresponding_live_object(Nvdimm::from_live_device(&live, 1).unwrap())?;
        assert!(nvdimm.differs_from_live_object());
        let change = nvdimm.to_update_spec()?;
        assert_eq!(change.device.key, 14100);
        match change.device.kind {
            DeviceKind::Nvdimm(e) => assert_eq!(e.capacity_mb, 2048),
            _ => panic!("expected an nvdimm"),
        }
        Ok(())
    }

    #[test]
    fn new_nvdimm_points_at_new_controller() -> miette::Result<()> {
        let controller = Rc::new(NvdimmController::new());
        controller.assign_placeholder_key(-1);
        let nvdimm = Nvdimm::new(1, 1024, controller);
        nvdimm.assign_placeholder_key(-2);
        let change = nvdimm.to_new_spec()?;
        assert_eq!(change.file_operation, Some(FileOperation::Create));
        match change.device.kind {
            DeviceKind::Nvdimm(e) => assert_eq!(e.controller_key, -1),
            _ => panic!("expected an nvdimm"),
        }
        Ok(())
    }
}
