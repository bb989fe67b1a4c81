pub mod devices;

// Reexports
pub use devices::{
    CdromParams, ClientDeviceMode, DiskParams, NetworkAdapterParams, NvdimmParams,
    NvmeControllerParams, ScsiControllerParams, UsbControllerParams,
};

use crate::vsphere::{BootFirmware, SharesLevel};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::{CastError, TomlError, VmwrightError};

fn default_true() -> bool {
    true
}

#[derive(
    Debug, Default, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VmState {
    #[default]
    Present,
    Absent,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct CpuParams {
    pub cores: Option<i32>,
    pub cores_per_socket: Option<i32>,
    pub enable_hot_add: Option<bool>,
    pub enable_hot_remove: Option<bool>,
    pub enable_performance_counters: Option<bool>,
    pub shares: Option<i32>,
    pub shares_level: Option<SharesLevel>,
    pub limit: Option<i64>,
    pub reservation: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct MemoryParams {
    pub size_mb: Option<i64>,
    pub enable_hot_add: Option<bool>,
    pub reserve_all_memory: Option<bool>,
    pub shares: Option<i32>,
    pub shares_level: Option<SharesLevel>,
    pub limit: Option<i64>,
    pub reservation: Option<i64>,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EncryptionMode {
    Disabled,
    Opportunistic,
    Required,
}
impl EncryptionMode {
    /// Name of the fault tolerance encryption mode on the backend.
    pub fn as_ft_encryption_mode(&self) -> String {
        let mode = match self {
            EncryptionMode::Disabled => "Disabled",
            EncryptionMode::Opportunistic => "Opportunistic",
            EncryptionMode::Required => "Required",
        };
        format!("ftEncryption{}", mode)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VmOptionsParams {
    pub maximum_remote_console_sessions: Option<i32>,
    pub encrypted_vmotion: Option<EncryptionMode>,
    pub encrypted_fault_tolerance: Option<EncryptionMode>,
    pub enable_encryption: Option<bool>,
    pub enable_hardware_assisted_virtualization: Option<bool>,
    pub enable_io_mmu: Option<bool>,
    pub enable_virtual_based_security: Option<bool>,
    pub enable_secure_boot: Option<bool>,
    pub boot_firmware: Option<BootFirmware>,
}

/*
* Desired state of a vm as requested by the user.
* Every group left unset is not managed by the request.
*/
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct VmParams {
    #[serde(default)]
    pub state: VmState,
    pub name: Option<String>,
    pub guest_id: Option<String>,
    /// Only read on creation, the vm is built as "vmx-<version>".
    pub hardware_version: Option<u32>,
    #[serde(default)]
    pub allow_power_cycling: bool,
    /// Unregister an absent vm instead of destroying its files.
    #[serde(default)]
    pub delete_from_inventory: bool,

    // Placement, only read on creation.
    pub datacenter: Option<String>,
    /// Absolute or relative to the datacenter vm folder.
    pub folder: Option<String>,
    pub cluster: Option<String>,
    pub resource_pool: Option<String>,
    pub esxi_host: Option<String>,
    /// Datastore or datastore cluster name.
    pub datastore: Option<String>,

    pub cpu: Option<CpuParams>,
    pub memory: Option<MemoryParams>,
    pub vm_options: Option<VmOptionsParams>,

    pub scsi_controllers: Option<Vec<ScsiControllerParams>>,
    pub nvme_controllers: Option<Vec<NvmeControllerParams>>,
    pub sata_controller_count: Option<u32>,
    pub usb_controllers: Option<Vec<UsbControllerParams>>,
    #[serde(default = "default_true")]
    pub controllers_remove_unmanaged: bool,

    pub disks: Option<Vec<DiskParams>>,
    #[serde(default = "default_true")]
    pub disks_remove_unmanaged: bool,
    /// Detach unmanaged disks instead of destroying their backing file.
    #[serde(default)]
    pub disks_detach_only: bool,

    pub cdroms: Option<Vec<CdromParams>>,
    #[serde(default = "default_true")]
    pub cdroms_remove_unmanaged: bool,

    pub network_adapters: Option<Vec<NetworkAdapterParams>>,
    #[serde(default = "default_true")]
    pub network_adapters_remove_unmanaged: bool,

    pub nvdimms: Option<Vec<NvdimmParams>>,
    #[serde(default = "default_true")]
    pub nvdimms_remove_unmanaged: bool,
}
impl Default for VmParams {
    fn default() -> Self {
        Self {
            state: VmState::Present,
            name: None,
            guest_id: None,
            hardware_version: None,
            allow_power_cycling: false,
            delete_from_inventory: false,
            datacenter: None,
            folder: None,
            cluster: None,
            resource_pool: None,
            esxi_host: None,
            datastore: None,
            cpu: None,
            memory: None,
            vm_options: None,
            scsi_controllers: None,
            nvme_controllers: None,
            sata_controller_count: None,
            usb_controllers: None,
            controllers_remove_unmanaged: true,
            disks: None,
            disks_remove_unmanaged: true,
            disks_detach_only: false,
            cdroms: None,
            cdroms_remove_unmanaged: true,
            network_adapters: None,
            network_adapters_remove_unmanaged: true,
            nvdimms: None,
            nvdimms_remove_unmanaged: true,
        }
    }
}
impl VmParams {
    /*
     * Load parameters from a file.
     * The extension selects the format, toml being the default.
     */
    pub fn from_file(path: &str) -> Result<Self, VmwrightError> {
        debug!("loading vm parameters from {:#?}", path);
        let string = fs::read_to_string(path)?;
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&string),
            _ => Self::from_toml(&string),
        }
    }
    pub fn from_toml(string: &str) -> Result<Self, VmwrightError> {
        let res = toml::from_str::<Self>(string);
        let item = match res {
            Ok(res) => res,
            Err(e) => {
                let err = CastError::TomlError(TomlError::new(e, string));
                return Err(err.into());
            }
        };
        trace!("{:#?}", item);
        Ok(item)
    }
    pub fn from_json(string: &str) -> Result<Self, VmwrightError> {
        Ok(serde_json::from_str::<Self>(string)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn params_from_toml() -> Result<()> {
        let toml = r#"
            name = "web-01"
            guest_id = "rhel9_64Guest"
            datastore = "ds-01"
            allow_power_cycling = true
            disks_remove_unmanaged = false

            [cpu]
            cores = 4
            cores_per_socket = 2
            shares_level = "high"

            [memory]
            size_mb = 4096

            [[scsi_controllers]]
            bus_number = 0
            controller_type = "paravirtual"

            [[disks]]
            size = "40gb"
            provisioning = "thin"
            device_node = "SCSI(0:0)"

            [[network_adapters]]
            network = "VM Network"
            adapter_type = "vmxnet3"
        "#;
        let params = VmParams::from_toml(toml)?;
        assert_eq!(params.cpu.as_ref().and_then(|e| e.cores), Some(4));
        assert_eq!(
            params.cpu.as_ref().and_then(|e| e.shares_level),
            Some(SharesLevel::High)
        );
        assert_eq!(params.disks.as_ref().map(|e| e.len()), Some(1));
        assert!(params.allow_power_cycling);
        assert!(!params.disks_remove_unmanaged);
        assert!(params.network_adapters_remove_unmanaged);
        assert_eq!(params.nvdimms, None);
        Ok(())
    }

    #[test]
    fn absent_state_from_toml() -> Result<()> {
        let toml = r#"
            state = "absent"
            name = "web-01"
            delete_from_inventory = true
        "#;
        let params = VmParams::from_toml(toml)?;
        assert_eq!(params.state, VmState::Absent);
        assert!(params.delete_from_inventory);
        assert_eq!(VmParams::from_toml("name = \"web-01\"")?.state, VmState::Present);
        Ok(())
    }

    #[test]
    fn params_from_json() -> Result<()> {
        let json = r#"{"name": "web-01", "memory": {"size_mb": 1024, "enable_hot_add": true}}"#;
        let params = VmParams::from_json(json)?;
        assert_eq!(
            params.memory,
            Some(MemoryParams {
                size_mb: Some(1024),
                enable_hot_add: Some(true),
                ..Default::default()
            })
        );
        assert!(params.cdroms_remove_unmanaged);
        Ok(())
    }

    #[test]
    fn ft_encryption_mode_name() {
        assert_eq!(
            EncryptionMode::Opportunistic.as_ft_encryption_mode(),
            "ftEncryptionOpportunistic"
        );
    }
}
