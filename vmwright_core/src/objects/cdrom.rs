use super::{
    compare_attributes_for_changes, output_map, Controller, DeviceState, LiveLink, Linkable,
    VsphereObject,
};
use crate::params::ClientDeviceMode;
use crate::vsphere::{CdromBacking, ConnectInfo, DeviceChange, DeviceKind, VirtualCdrom, VirtualDevice};

use bon::bon;
use serde_json::{json, Map, Value};
use std::rc::Rc;

// Error Handling
use miette::Result;
use vmwright_error::{LibError, VmwrightError};

/*
* A cdrom drive, backed either by an iso file or by the client device.
*/
#[derive(Debug)]
pub struct Cdrom {
    pub unit_number: u32,
    pub controller: Option<Rc<Controller>>,
    pub controller_key: Option<i32>,
    pub iso_media_path: Option<String>,
    pub client_device_mode: Option<ClientDeviceMode>,
    pub connect_at_power_on: Option<bool>,
    state: DeviceState,
    live: LiveLink<Cdrom>,
}

impl Linkable for Cdrom {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

#[bon]
impl Cdrom {
    #[builder]
    pub fn new(
        controller: Rc<Controller>,
        unit_number: u32,
        iso_media_path: Option<String>,
        client_device_mode: Option<ClientDeviceMode>,
        connect_at_power_on: Option<bool>,
    ) -> Self {
        Self {
            unit_number,
            controller: Some(controller),
            controller_key: None,
            iso_media_path,
            client_device_mode,
            connect_at_power_on,
            state: DeviceState::default(),
            live: LiveLink::default(),
        }
    }
}

impl Cdrom {
    pub fn from_live_device(device: &VirtualDevice, controller: Option<Rc<Controller>>) -> Option<Self> {
        let cdrom = match &device.kind {
            DeviceKind::Cdrom(cdrom) => cdrom,
            _ => return None,
        };
        let (iso_media_path, client_device_mode) = match &cdrom.backing {
            CdromBacking::Iso { file_name } => (Some(file_name.to_owned()), None),
            CdromBacking::RemotePassthrough => (None, Some(ClientDeviceMode::Passthrough)),
            CdromBacking::RemoteAtapi => (None, Some(ClientDeviceMode::Emulated)),
        };
        Some(Self {
            unit_number: cdrom.unit_number,
            controller,
            controller_key: Some(cdrom.controller_key),
            iso_media_path,
            client_device_mode,
            connect_at_power_on: cdrom.connectable.as_ref().and_then(|e| e.start_connected),
            state: DeviceState::from_raw(device),
            live: LiveLink::default(),
        })
    }
    pub fn link_corresponding_live_object(&self, live: Cdrom) -> Result<(), VmwrightError> {
        self.live.link(live, &self.name_as_str())?;
        Ok(())
    }

    fn controller_name(&self) -> String {
        match (&self.controller, self.controller_key) {
            (Some(controller), _) => controller.name_as_str(),
            (None, Some(key)) => format!("Controller {}", key),
            (None, None) => "Unknown Controller".to_owned(),
        }
    }
    fn backing(&self) -> CdromBacking {
        match (&self.iso_media_path, self.client_device_mode) {
            (Some(path), _) => CdromBacking::Iso {
                file_name: path.to_owned(),
            },
            (None, Some(ClientDeviceMode::Emulated)) => CdromBacking::RemoteAtapi,
            (None, _) => CdromBacking::RemotePassthrough,
        }
    }
    fn apply_options(&self, cdrom: &mut VirtualCdrom) {
        if self.iso_media_path.is_some() || self.client_device_mode.is_some() {
            cdrom.backing = self.backing();
        }
        if let Some(connect) = self.connect_at_power_on {
            let connectable = cdrom.connectable.get_or_insert_with(ConnectInfo::default);
            connectable.start_connected = Some(connect);
        }
    }
    fn missing_raw_device(&self, action: &str) -> LibError {
        LibError::builder()
            .msg(&format!("{} has no live device to {}", self.name_as_str(), action))
            .help("Only cdroms linked to a live device can be edited or removed")
            .build()
    }
}

impl VsphereObject for Cdrom {
    fn name_as_str(&self) -> String {
        format!("CD-ROM - {} Unit {}", self.controller_name(), self.unit_number)
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no device key", self.name_as_str()))
                .help("Track the cdrom before building its creation request")
                .build()
        })?;
        let controller_key = self
            .controller
            .as_ref()
            .and_then(|e| e.key())
            .ok_or_else(|| {
                LibError::builder()
                    .msg(&format!("{} has no key yet", self.controller_name()))
                    .help("Controllers must be added to the request before their devices")
                    .build()
            })?;
        let mut cdrom = VirtualCdrom {
            controller_key,
            unit_number: self.unit_number,
            backing: self.backing(),
            connectable: Some(ConnectInfo::default()),
        };
        self.apply_options(&mut cdrom);
        Ok(DeviceChange::add(VirtualDevice::new(
            key,
            DeviceKind::Cdrom(cdrom),
        )))
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let mut device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("edit"))?;
        if let DeviceKind::Cdrom(cdrom) = &mut device.kind {
            self.apply_options(cdrom);
        }
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("remove"))?;
        Ok(DeviceChange::remove(device))
    }
    fn differs_from_live_object(&self) -> bool {
        let live = match self.live.get() {
            Some(live) => live,
            None => return true,
        };
        if compare_attributes_for_changes(&self.iso_media_path, &live.iso_media_path)
            || compare_attributes_for_changes(&self.client_device_mode, &live.client_device_mode)
        {
            return true;
        }
        // Client devices handle the power on connection themselves.
        self.iso_media_path.is_some()
            && compare_attributes_for_changes(&self.connect_at_power_on, &live.connect_at_power_on)
    }
    fn to_module_output(&self) -> Map<String, Value> {
        output_map([
            ("object_type", json!("cdrom")),
            ("unit_number", json!(self.unit_number)),
            ("iso_media_path", json!(self.iso_media_path)),
            (
                "client_device_mode",
                json!(self.client_device_mode.map(|e| e.to_string())),
            ),
            ("connect_at_power_on", json!(self.connect_at_power_on)),
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
