use crate::vsphere::{
    AdapterType, BusSharing, DiskMode, Provisioning, SharesLevel, UsbControllerType,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct DiskParams {
    /// Human readable size, like "40gb".
    pub size: Option<String>,
    pub provisioning: Option<Provisioning>,
    pub mode: Option<DiskMode>,
    pub enable_sharing: Option<bool>,
    pub datastore: Option<String>,
    /// Full backing path "[datastore] folder/disk.vmdk".
    pub filename: Option<String>,
    /// Like "SCSI(0:1)".
    pub device_node: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct ScsiControllerParams {
    pub bus_number: u32,
    /// One of lsilogic, paravirtual, buslogic, lsilogicsas.
    pub controller_type: String,
    pub bus_sharing: Option<BusSharing>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct NvmeControllerParams {
    pub bus_number: u32,
    pub bus_sharing: Option<BusSharing>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct UsbControllerParams {
    pub controller_type: UsbControllerType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientDeviceMode {
    Passthrough,
    Emulated,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct CdromParams {
    pub device_node: String,
    pub iso_media_path: Option<String>,
    pub client_device_mode: Option<ClientDeviceMode>,
    pub connect_at_power_on: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct NetworkAdapterParams {
    /// Portgroup name or id.
    pub network: String,
    pub adapter_type: Option<AdapterType>,
    pub connected: Option<bool>,
    pub connect_at_power_on: Option<bool>,
    /// "automatic" lets the backend generate an address.
    pub mac_address: Option<String>,
    pub shares: Option<i32>,
    pub shares_level: Option<SharesLevel>,
    pub reservation: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct NvdimmParams {
    pub size_mb: i64,
}
