//! Data exchanged with the virtualization backend.
pub mod device;
pub mod resources;
pub mod spec;
pub mod vm;

// Reexports
pub use device::*;
pub use resources::{ResourceAllocationInfo, SharesInfo, SharesLevel};
pub use spec::{ConfigSpec, DeviceChange, DeviceOperation, FileOperation};
pub use vm::{
    BootFirmware, BootOptions, FileInfo, FlagInfo, LiveVm, PowerState, VirtualHardware,
    VmConfigInfo,
};
