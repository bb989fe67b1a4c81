use super::{BootFirmware, BootOptions, FileInfo, FlagInfo, ResourceAllocationInfo, VirtualDevice};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileOperation {
    Create,
    Destroy,
}

/// One entry of the ordered device change list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceChange {
    pub operation: DeviceOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_operation: Option<FileOperation>,
    pub device: VirtualDevice,
}
impl DeviceChange {
    pub fn add(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Add,
            file_operation: None,
            device,
        }
    }
    pub fn edit(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Edit,
            file_operation: None,
            device,
        }
    }
    pub fn remove(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Remove,
            file_operation: None,
            device,
        }
    }
    pub fn with_file_operation(mut self, operation: FileOperation) -> Self {
        self.file_operation = Some(operation);
        self
    }
}

/*
* The aggregated configuration request submitted to the backend.
* Unset fields are left untouched by the backend.
*/
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FileInfo>,
    /// Hardware version of a new vm, "vmx-<n>".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cores_per_socket: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_hot_add_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_hot_remove_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpmc_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_allocation: Option<ResourceAllocationInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_hot_add_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_reservation_locked_to_max: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_allocation: Option<ResourceAllocationInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_mks_connections: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate_encryption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ft_encryption_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sev_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_hv_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<BootFirmware>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<FlagInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_options: Option<BootOptions>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_change: Vec<DeviceChange>,
}
