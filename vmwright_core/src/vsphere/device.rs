use super::ResourceAllocationInfo;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/*
* A device as the backend describes it.
* The same shape is used to read live devices and to submit
* device changes.
*/
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VirtualDevice {
    /// Backend key, negative for devices created by the current request.
    pub key: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: DeviceKind,
}
impl VirtualDevice {
    pub fn new(key: i32, kind: DeviceKind) -> Self {
        Self {
            key,
            label: None,
            kind,
        }
    }
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            DeviceKind::ScsiController(_) => "scsi_controller",
            DeviceKind::SataController(_) => "sata_controller",
            DeviceKind::NvmeController(_) => "nvme_controller",
            DeviceKind::IdeController(_) => "ide_controller",
            DeviceKind::UsbController(_) => "usb_controller",
            DeviceKind::NvdimmController => "nvdimm_controller",
            DeviceKind::Disk(_) => "disk",
            DeviceKind::Cdrom(_) => "cdrom",
            DeviceKind::EthernetCard(_) => "ethernet_card",
            DeviceKind::Nvdimm(_) => "nvdimm",
            DeviceKind::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceKind {
    ScsiController(VirtualScsiController),
    SataController(VirtualController),
    NvmeController(VirtualNvmeController),
    IdeController(VirtualController),
    UsbController(VirtualUsbController),
    NvdimmController,
    Disk(VirtualDisk),
    Cdrom(VirtualCdrom),
    EthernetCard(VirtualEthernetCard),
    Nvdimm(VirtualNvdimm),
    /// Video cards, keyboards and any device injected by the platform.
    #[serde(other)]
    Other,
}

////////////////////////////////
// Controllers

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualController {
    pub bus_number: u32,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScsiControllerType {
    Lsilogic,
    Paravirtual,
    Buslogic,
    Lsilogicsas,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BusSharing {
    NoSharing,
    VirtualSharing,
    PhysicalSharing,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualScsiController {
    pub bus_number: u32,
    pub controller_type: ScsiControllerType,
    pub bus_sharing: Option<BusSharing>,
    pub hot_add_remove: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualNvmeController {
    pub bus_number: u32,
    pub bus_sharing: Option<BusSharing>,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UsbControllerType {
    Usb2,
    Usb3,
}
impl UsbControllerType {
    /// Usb controllers have no bus, each type lives at most once on a vm.
    pub fn bus_number(&self) -> u32 {
        match self {
            UsbControllerType::Usb2 => 0,
            UsbControllerType::Usb3 => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualUsbController {
    pub controller_type: UsbControllerType,
}

////////////////////////////////
// Disks

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiskMode {
    Persistent,
    Nonpersistent,
    IndependentPersistent,
    IndependentNonpersistent,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provisioning {
    Thin,
    Thick,
    Eagerzeroedthick,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DiskSharing {
    SharingNone,
    SharingMultiWriter,
}
impl From<bool> for DiskSharing {
    fn from(enabled: bool) -> Self {
        match enabled {
            true => DiskSharing::SharingMultiWriter,
            false => DiskSharing::SharingNone,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct DiskBacking {
    /// "[datastore] path/to/file.vmdk", or "[datastore]" to let the backend choose.
    pub file_name: String,
    pub datastore: Option<String>,
    pub disk_mode: Option<DiskMode>,
    pub thin_provisioned: Option<bool>,
    pub eagerly_scrub: Option<bool>,
    pub sharing: Option<DiskSharing>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualDisk {
    pub controller_key: i32,
    pub unit_number: u32,
    pub capacity_kb: u64,
    pub backing: DiskBacking,
}

////////////////////////////////
// Cdroms

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct ConnectInfo {
    pub start_connected: Option<bool>,
    pub connected: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CdromBacking {
    Iso { file_name: String },
    RemotePassthrough,
    RemoteAtapi,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualCdrom {
    pub controller_key: i32,
    pub unit_number: u32,
    pub backing: CdromBacking,
    pub connectable: Option<ConnectInfo>,
}

////////////////////////////////
// Network

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdapterType {
    E1000,
    E1000e,
    Pcnet32,
    Vmxnet2,
    Vmxnet3,
    Sriov,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AddressType {
    Generated,
    Manual,
    Assigned,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkBacking {
    /// Distributed switch portgroup.
    DistributedPort {
        portgroup_key: String,
        switch_uuid: String,
    },
    /// NSX logical switch.
    Opaque { opaque_network_id: String },
    /// Standard switch portgroup.
    Network {
        device_name: String,
        network: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualEthernetCard {
    pub adapter_type: AdapterType,
    pub backing: Option<NetworkBacking>,
    pub address_type: Option<AddressType>,
    pub mac_address: Option<String>,
    pub connectable: Option<ConnectInfo>,
    pub resource_allocation: Option<ResourceAllocationInfo>,
}

////////////////////////////////
// Nvdimm

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VirtualNvdimm {
    pub controller_key: i32,
    pub capacity_mb: i64,
}
