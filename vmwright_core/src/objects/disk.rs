use super::{
    compare_attributes_for_changes, output_map, Controller, DeviceState, LiveLink, Linkable,
    VsphereObject,
};
use crate::vsphere::{
    DeviceChange, DeviceKind, DiskBacking, DiskMode, DiskSharing, FileOperation, Provisioning,
    VirtualDevice, VirtualDisk,
};

use bon::bon;
use serde_json::{json, Map, Value};
use std::rc::Rc;

// Error Handling
use miette::Result;
use vmwright_error::{LibError, ParameterError, VmwrightError};

/// Datastore name of a backing path like "[datastore] folder/disk.vmdk".
pub fn datastore_of_path(path: &str) -> Option<String> {
    let rest = path.trim().strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(rest[..end].to_owned())
}

/*
* A virtual disk attached to a controller slot.
* The size is held in KB.
*/
#[derive(Debug)]
pub struct Disk {
    pub size_kb: Option<u64>,
    pub provisioning: Option<Provisioning>,
    pub mode: Option<DiskMode>,
    pub enable_sharing: Option<bool>,
    pub datastore: Option<String>,
    pub filename: Option<String>,
    pub unit_number: u32,
    pub controller: Option<Rc<Controller>>,
    /// Controller key of a live disk.
    pub controller_key: Option<i32>,
    /// Removal keeps the backing file.
    pub detach_only: bool,
    state: DeviceState,
    live: LiveLink<Disk>,
}

impl Linkable for Disk {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

#[bon]
impl Disk {
    #[builder]
    pub fn new(
        controller: Rc<Controller>,
        unit_number: u32,
        size_kb: Option<u64>,
        provisioning: Option<Provisioning>,
        mode: Option<DiskMode>,
        enable_sharing: Option<bool>,
        datastore: Option<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            size_kb,
            provisioning,
            mode,
            enable_sharing,
            datastore,
            filename,
            unit_number,
            controller: Some(controller),
            controller_key: None,
            detach_only: false,
            state: DeviceState::default(),
            live: LiveLink::default(),
        }
    }
}

impl Disk {
    pub fn from_live_device(device: &VirtualDevice, controller: Option<Rc<Controller>>) -> Option<Self> {
        let disk = match &device.kind {
            DeviceKind::Disk(disk) => disk,
            _ => return None,
        };
        let provisioning = match (disk.backing.thin_provisioned, disk.backing.eagerly_scrub) {
            (Some(true), _) => Provisioning::Thin,
            (_, Some(true)) => Provisioning::Eagerzeroedthick,
            _ => Provisioning::Thick,
        };
        Some(Self {
            size_kb: Some(disk.capacity_kb),
            provisioning: Some(provisioning),
            mode: disk.backing.disk_mode,
            enable_sharing: disk
                .backing
                .sharing
                .map(|e| e == DiskSharing::SharingMultiWriter),
            datastore: disk
                .backing
                .datastore
                .clone()
                .or_else(|| datastore_of_path(&disk.backing.file_name)),
            filename: Some(disk.backing.file_name.to_owned()),
            unit_number: disk.unit_number,
            controller,
            controller_key: Some(disk.controller_key),
            detach_only: false,
            state: DeviceState::from_raw(device),
            live: LiveLink::default(),
        })
    }
    pub fn detach_only(mut self, detach_only: bool) -> Self {
        self.detach_only = detach_only;
        self
    }

    /// Datastore the disk lives on, explicit or taken from its backing path.
    pub fn effective_datastore(&self) -> Option<String> {
        self.datastore
            .clone()
            .or_else(|| self.filename.as_deref().and_then(datastore_of_path))
    }

    /*
     * Link the live disk found at this disk's controller slot.
     * Disks can only grow.
     */
    pub fn link_corresponding_live_object(&self, live: Disk) -> Result<(), VmwrightError> {
        if let (Some(size), Some(live_size)) = (self.size_kb, live.size_kb) {
            if size < live_size {
                return Err(ParameterError::builder()
                    .parameter("disks")
                    .msg(&format!(
                        "Disk size cannot be decreased. {} is {}KB but the requested size is {}KB.",
                        self.name_as_str(),
                        live_size,
                        size
                    ))
                    .details(json!({
                        "device": self.name_as_str(),
                        "size_kb": size,
                        "current_size_kb": live_size,
                    }))
                    .build()
                    .into());
            }
        }
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
    fn missing_raw_device(&self, action: &str) -> LibError {
        LibError::builder()
            .msg(&format!("{} has no live device to {}", self.name_as_str(), action))
            .help("Only disks linked to a live device can be edited or removed")
            .build()
    }

    /// Options shared by creation and edition.
    fn apply_options(&self, disk: &mut VirtualDisk) {
        if let Some(size) = self.size_kb {
            disk.capacity_kb = size;
        }
        if let Some(mode) = self.mode {
            disk.backing.disk_mode = Some(mode);
        }
        if let Some(sharing) = self.enable_sharing {
            disk.backing.sharing = Some(DiskSharing::from(sharing));
        }
        if let Some(datastore) = self.effective_datastore() {
            disk.backing.datastore = Some(datastore);
        }
    }
}

impl VsphereObject for Disk {
    fn name_as_str(&self) -> String {
        format!("Disk - {} Unit {}", self.controller_name(), self.unit_number)
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no device key", self.name_as_str()))
                .help("Track the disk before building its creation request")
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

        let file_name = match (&self.filename, &self.datastore) {
            (Some(filename), _) => filename.to_owned(),
            (None, Some(datastore)) => format!("[{}]", datastore),
            (None, None) => String::new(),
        };
        let mut disk = VirtualDisk {
            controller_key,
            unit_number: self.unit_number,
            capacity_kb: 0,
            backing: DiskBacking {
                file_name,
                disk_mode: Some(self.mode.unwrap_or(DiskMode::Persistent)),
                thin_provisioned: Some(self.provisioning == Some(Provisioning::Thin)),
                eagerly_scrub: Some(self.provisioning == Some(Provisioning::Eagerzeroedthick)),
                ..Default::default()
            },
        };
        self.apply_options(&mut disk);

        let change = DeviceChange::add(VirtualDevice::new(key, DeviceKind::Disk(disk)));
        // An existing backing file is attached, not created.
        match self.filename {
            Some(_) => Ok(change),
            None => Ok(change.with_file_operation(FileOperation::Create)),
        }
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let mut device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("edit"))?;
        if let DeviceKind::Disk(disk) = &mut device.kind {
            self.apply_options(disk);
        }
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("remove"))?;
        let change = DeviceChange::remove(device);
        match self.detach_only {
            true => Ok(change),
            false => Ok(change.with_file_operation(FileOperation::Destroy)),
        }
    }
    fn differs_from_live_object(&self) -> bool {
        let live = match self.live.get() {
            Some(live) => live,
            None => return true,
        };
        // Provisioning can not change once the disk exists.
        compare_attributes_for_changes(&self.size_kb, &live.size_kb)
            || compare_attributes_for_changes(&self.mode, &live.mode)
            || compare_attributes_for_changes(&self.enable_sharing, &live.enable_sharing)
            || compare_attributes_for_changes(&self.effective_datastore(), &live.datastore)
    }
    fn to_module_output(&self) -> Map<String, Value> {
        let device_node = self.controller.as_ref().map(|e| {
            format!(
                "{}({}:{})",
                e.category().to_string().to_uppercase(),
                e.bus_number,
                self.unit_number
            )
        });
        output_map([
            ("object_type", json!("disk")),
            ("device_node", json!(device_node)),
            ("size_kb", json!(self.size_kb)),
            ("provisioning", json!(self.provisioning)),
            ("mode", json!(self.mode)),
            ("enable_sharing", json!(self.enable_sharing)),
            ("datastore", json!(self.effective_datastore())),
            ("filename", json!(self.filename)),
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
    use crate::objects::ControllerModel;
    use crate::vsphere::ScsiControllerType;
    use pretty_assertions::assert_eq;

    fn scsi() -> Rc<Controller> {
        Rc::new(Controller::new(
            0,
            ControllerModel::Scsi {
                controller_type: ScsiControllerType::Paravirtual,
                bus_sharing: None,
            },
        ))
    }
    fn live_disk(capacity_kb: u64) -> VirtualDevice {
        VirtualDevice::new(
            2000,
            DeviceKind::Disk(VirtualDisk {
                controller_key: 1000,
                unit_number: 1,
                capacity_kb,
                backing: DiskBacking {
                    file_name: "[ds-01] web-01/web-01.vmdk".to_owned(),
                    disk_mode: Some(DiskMode::Persistent),
                    thin_provisioned: Some(true),
                    ..Default::default()
                },
            }),
        )
    }

    #[test]
    fn datastore_from_path() {
        assert_eq!(
            datastore_of_path("[ds-01] web-01/web-01.vmdk"),
            Some("ds-01".to_owned())
        );
        assert_eq!(datastore_of_path("web-01.vmdk"), None);
    }

    #[test]
    fn shrink_is_rejected() {
        let disk = Disk::builder()
            .controller(scsi())
            .unit_number(1)
            .size_kb(1024)
            .build();
        let live = Disk::from_live_device(&live_disk(2048), None).unwrap();
        let err = disk.link_corresponding_live_object(live).unwrap_err();
        assert_eq!(err.parameter_name(), Some("disks"));
        assert!(!disk.has_live_object());
    }

    #[test]
    fn growing_or_equal_links() -> miette::Result<()> {
        for size in [2048, 4096] {
            let disk = Disk::builder()
                .controller(scsi())
                .unit_number(1)
                .size_kb(size)
                .build();
            let live = Disk::from_live_device(&live_disk(2048), None).unwrap();
            disk.link_corresponding_live_object(live)?;
            assert_eq!(disk.differs_from_live_object(), size != 2048);
        }
        Ok(())
    }

    #[test]
    fn provisioning_is_not_compared() -> miette::Result<()> {
        let disk = Disk::builder()
            .controller(scsi())
            .unit_number(1)
            .provisioning(Provisioning::Eagerzeroedthick)
            .build();
        let live = Disk::from_live_device(&live_disk(2048), None).unwrap();
        disk.link_corresponding_live_object(live)?;
        assert!(!disk.differs_from_live_object());
        Ok(())
    }

    #[test]
    fn new_disk_on_datastore() -> miette::Result<()> {
        let controller = scsi();
        controller.assign_placeholder_key(-1);
        let disk = Disk::builder()
            .controller(controller)
            .unit_number(0)
            .size_kb(1024)
            .datastore("ds-02".to_owned())
            .build();
        disk.assign_placeholder_key(-2);
        let change = disk.to_new_spec()?;
        assert_eq!(change.file_operation, Some(FileOperation::Create));
        match change.device.kind {
            DeviceKind::Disk(e) => {
                assert_eq!(e.controller_key, -1);
                assert_eq!(e.backing.file_name, "[ds-02]");
                assert_eq!(e.backing.disk_mode, Some(DiskMode::Persistent));
            }
            _ => panic!("expected a disk"),
        }
        Ok(())
    }

    #[test]
    fn change_set_output_drops_unset_fields() -> miette::Result<()> {
        let disk = Disk::builder()
            .controller(scsi())
            .unit_number(1)
            .size_kb(4096)
            .build();
        let live = Disk::from_live_device(&live_disk(2048), None).unwrap();
        disk.link_corresponding_live_object(live)?;
        let output = crate::objects::to_change_set_output(&disk);
        assert_eq!(output["new_value"]["size_kb"], json!(4096));
        assert_eq!(output["old_value"]["size_kb"], json!(2048));
        assert!(output["new_value"].get("mode").is_none());
        assert!(output["old_value"].get("mode").is_none());
        Ok(())
    }
}
