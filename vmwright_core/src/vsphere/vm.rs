use super::{ResourceAllocationInfo, VirtualDevice};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::{CastError, TomlError, VmwrightError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BootFirmware {
    Bios,
    Efi,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct VirtualHardware {
    pub num_cpu: Option<i32>,
    pub num_cores_per_socket: Option<i32>,
    pub memory_mb: Option<i64>,
    #[serde(default)]
    pub device: Vec<VirtualDevice>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct FlagInfo {
    pub vvtd_enabled: Option<bool>,
    pub vbs_enabled: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct BootOptions {
    pub efi_secure_boot_enabled: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct FileInfo {
    /// "[datastore]" or "[datastore] folder/vm.vmx"
    pub vm_path_name: Option<String>,
}

/*
* The live configuration of a vm.
* Every attribute may be missing, a missing attribute means
* "no value" and is never an error.
*/
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct VmConfigInfo {
    pub guest_id: Option<String>,
    #[serde(default)]
    pub hardware: VirtualHardware,

    pub cpu_hot_add_enabled: Option<bool>,
    pub cpu_hot_remove_enabled: Option<bool>,
    pub vpmc_enabled: Option<bool>,
    pub cpu_allocation: Option<ResourceAllocationInfo>,

    pub memory_hot_add_enabled: Option<bool>,
    pub memory_reservation_locked_to_max: Option<bool>,
    pub memory_allocation: Option<ResourceAllocationInfo>,

    pub max_mks_connections: Option<i32>,
    pub migrate_encryption: Option<String>,
    pub ft_encryption_mode: Option<String>,
    pub sev_enabled: Option<bool>,
    pub nested_hv_enabled: Option<bool>,
    pub firmware: Option<BootFirmware>,
    pub flags: Option<FlagInfo>,
    pub boot_options: Option<BootOptions>,
    pub files: Option<FileInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveVm {
    /// Managed object id.
    pub moid: String,
    pub name: String,
    pub uuid: Option<Uuid>,
    pub power_state: PowerState,
    #[serde(default)]
    pub config: VmConfigInfo,
}
impl LiveVm {
    pub fn devices(&self) -> &[VirtualDevice] {
        &self.config.hardware.device
    }
    pub fn is_powered_on(&self) -> bool {
        self.power_state == PowerState::PoweredOn
    }
    pub fn from_file(path: &str) -> Result<Self, VmwrightError> {
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
        trace!("loaded live vm {:#?}", item.name);
        Ok(item)
    }
    pub fn from_json(string: &str) -> Result<Self, VmwrightError> {
        Ok(serde_json::from_str::<Self>(string)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vsphere::DeviceKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn live_vm_from_toml() -> Result<()> {
        let toml = r#"
            moid = "vm-42"
            name = "web-01"
            power_state = "poweredOn"

            [config]
            guest_id = "rhel9_64Guest"
            cpu_hot_add_enabled = true

            [config.hardware]
            num_cpu = 4
            memory_mb = 2048

            [[config.hardware.device]]
            key = 1000
            [config.hardware.device.kind]
            type = "scsi_controller"
            bus_number = 0
            controller_type = "paravirtual"
            bus_sharing = "noSharing"

            [[config.hardware.device]]
            key = 500
            label = "Video card"
            [config.hardware.device.kind]
            type = "video_card"
        "#;
        let vm = LiveVm::from_toml(toml)?;
        assert_eq!(vm.power_state, PowerState::PoweredOn);
        assert!(vm.is_powered_on());
        assert_eq!(vm.config.hardware.num_cpu, Some(4));
        assert_eq!(vm.config.cpu_hot_remove_enabled, None);
        assert_eq!(vm.devices().len(), 2);
        assert_eq!(vm.devices()[1].kind, DeviceKind::Other);
        Ok(())
    }

    #[test]
    fn live_vm_from_bad_toml() {
        let res = LiveVm::from_toml("moid = ");
        assert!(res.is_err());
    }
}
