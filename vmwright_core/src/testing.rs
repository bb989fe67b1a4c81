//! Fixtures shared by the unit tests.
use crate::handlers::{ControllerHandler, ControllerPool, HandlerContext, ParameterHandler};
use crate::params::{CpuParams, DiskParams, MemoryParams, NetworkAdapterParams, ScsiControllerParams, VmParams};
use crate::services::{
    Cluster, CreationTarget, Datastore, Directory, EsxiHost, Folder, InMemoryDirectory, Network,
    ObjectCache, Placement, ResourcePool,
};
use crate::vm::VmBackend;
use crate::vsphere::{
    AdapterType, BootFirmware, ConfigSpec, DeviceKind, DiskBacking, LiveVm, NetworkBacking,
    PowerState, ScsiControllerType, VirtualController, VirtualDevice, VirtualDisk,
    VirtualEthernetCard, VirtualHardware, VirtualScsiController, VmConfigInfo,
};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

// Error Handling
use vmwright_error::{BackendError, VmwrightError};

// Logger
use env_logger::Builder;

pub type ControllerFactory = fn(&HandlerContext) -> Result<ControllerHandler, VmwrightError>;

/// Print engine logs in test output, filtered with VMWRIGHT_LOG.
pub fn init_logger() {
    let _ = Builder::from_env("VMWRIGHT_LOG").is_test(true).try_init();
}

pub fn directory() -> Rc<dyn Directory> {
    Rc::new(InMemoryDirectory {
        datastores: vec![Datastore {
            moid: "datastore-11".to_owned(),
            name: "ds-01".to_owned(),
            free_space: 500 * 1024 * 1024 * 1024,
        }],
        datastore_clusters: vec![],
        networks: vec![
            Network {
                moid: "network-11".to_owned(),
                name: "VM Network".to_owned(),
                backing: NetworkBacking::Network {
                    device_name: "VM Network".to_owned(),
                    network: Some("network-11".to_owned()),
                },
            },
            Network {
                moid: "dvportgroup-21".to_owned(),
                name: "dvs-prod".to_owned(),
                backing: NetworkBacking::DistributedPort {
                    portgroup_key: "dvportgroup-21".to_owned(),
                    switch_uuid: "50 2a 7f 0e".to_owned(),
                },
            },
        ],
        folders: vec![Folder {
            moid: "group-v3".to_owned(),
            path: "dc-01/vm".to_owned(),
        }],
        clusters: vec![Cluster {
            moid: "domain-c7".to_owned(),
            name: "cluster-01".to_owned(),
            resource_pool: ResourcePool {
                moid: "resgroup-8".to_owned(),
                name: "Resources".to_owned(),
            },
        }],
        resource_pools: vec![],
        esxi_hosts: vec![EsxiHost {
            moid: "host-12".to_owned(),
            name: "esx-01".to_owned(),
        }],
    })
}

pub fn context(params: VmParams, vm: Option<LiveVm>) -> HandlerContext {
    let params = Rc::new(params);
    let cache = Rc::new(ObjectCache::new(directory()));
    HandlerContext {
        placement: Rc::new(Placement::new(params.clone(), cache.clone())),
        params,
        vm: vm.map(Rc::new),
        cache,
        controllers: ControllerPool::default(),
    }
}

/// Hand the controllers of the given handlers to the context.
pub fn with_controllers(
    ctx: HandlerContext,
    factories: &[ControllerFactory],
) -> Result<HandlerContext, VmwrightError> {
    let mut controllers = vec![];
    for factory in factories {
        controllers.extend(factory(&ctx)?.managed_controllers());
    }
    Ok(HandlerContext {
        controllers: ControllerPool::new(controllers),
        ..ctx
    })
}

pub fn creation_params() -> VmParams {
    VmParams {
        name: Some("web-01".to_owned()),
        guest_id: Some("rhel9_64Guest".to_owned()),
        datacenter: Some("dc-01".to_owned()),
        cluster: Some("cluster-01".to_owned()),
        datastore: Some("ds-01".to_owned()),
        cpu: Some(CpuParams {
            cores: Some(2),
            ..Default::default()
        }),
        memory: Some(MemoryParams {
            size_mb: Some(2048),
            ..Default::default()
        }),
        scsi_controllers: Some(vec![ScsiControllerParams {
            bus_number: 0,
            controller_type: "paravirtual".to_owned(),
            bus_sharing: None,
        }]),
        disks: Some(vec![DiskParams {
            size: Some("10gb".to_owned()),
            device_node: "SCSI(0:0)".to_owned(),
            ..Default::default()
        }]),
        network_adapters: Some(vec![NetworkAdapterParams {
            network: "VM Network".to_owned(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// A bios vm with its two ide controllers and 4 cpus.
pub fn live_vm(power_state: PowerState) -> LiveVm {
    LiveVm {
        moid: "vm-42".to_owned(),
        name: "web-01".to_owned(),
        uuid: None,
        power_state,
        config: VmConfigInfo {
            guest_id: Some("rhel9_64Guest".to_owned()),
            firmware: Some(BootFirmware::Bios),
            hardware: VirtualHardware {
                num_cpu: Some(4),
                device: vec![
                    VirtualDevice::new(200, DeviceKind::IdeController(VirtualController { bus_number: 0 }))
                        .with_label("IDE 0"),
                    VirtualDevice::new(201, DeviceKind::IdeController(VirtualController { bus_number: 1 }))
                        .with_label("IDE 1"),
                ],
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

pub fn scsi_controller(key: i32, bus_number: u32) -> VirtualDevice {
    VirtualDevice::new(
        key,
        DeviceKind::ScsiController(VirtualScsiController {
            bus_number,
            controller_type: ScsiControllerType::Paravirtual,
            bus_sharing: None,
            hot_add_remove: None,
        }),
    )
}

pub fn scsi_disk(key: i32, controller_key: i32, unit_number: u32, capacity_kb: u64) -> VirtualDevice {
    VirtualDevice::new(
        key,
        DeviceKind::Disk(VirtualDisk {
            controller_key,
            unit_number,
            capacity_kb,
            backing: DiskBacking {
                file_name: format!("[ds-01] web-01/web-01_{}.vmdk", unit_number),
                datastore: Some("datastore-11".to_owned()),
                ..Default::default()
            },
        }),
    )
}

pub fn ethernet_card(key: i32, backing: NetworkBacking) -> VirtualDevice {
    VirtualDevice::new(
        key,
        DeviceKind::EthernetCard(VirtualEthernetCard {
            adapter_type: AdapterType::Vmxnet3,
            backing: Some(backing),
            address_type: None,
            mac_address: None,
            connectable: None,
            resource_allocation: None,
        }),
    )
}

#[derive(Debug, Clone, Copy)]
pub enum BackendFault {
    InvalidPowerState,
    /// Position of the refused device in the change list.
    InvalidDeviceSpec(usize),
}

/*
* Backend recording every call it receives.
* An optional fault is raised by the first create or reconfigure call.
*/
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: RefCell<Vec<String>>,
    fault: Cell<Option<BackendFault>>,
    target: RefCell<Option<CreationTarget>>,
}

impl RecordingBackend {
    pub fn failing_once(fault: BackendFault) -> Self {
        Self {
            calls: RefCell::new(vec![]),
            fault: Cell::new(Some(fault)),
            target: RefCell::new(None),
        }
    }
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
    /// Where the last created vm was placed.
    pub fn target(&self) -> Option<CreationTarget> {
        self.target.borrow().clone()
    }
    fn record(&self, call: &str) -> Result<(), VmwrightError> {
        self.calls.borrow_mut().push(call.to_owned());
        match self.fault.take() {
            None => Ok(()),
            Some(BackendFault::InvalidPowerState) => Err(BackendError::InvalidPowerState {
                message: "The attempted operation cannot be performed in the current state (Powered on).".to_owned(),
            }
            .into()),
            Some(BackendFault::InvalidDeviceSpec(device_id)) => Err(BackendError::InvalidDeviceSpec {
                device_id,
                message: format!("Invalid configuration for device '{}'.", device_id - 1),
            }
            .into()),
        }
    }
}

impl VmBackend for RecordingBackend {
    fn create_vm(&self, spec: &ConfigSpec, target: &CreationTarget) -> Result<LiveVm, VmwrightError> {
        self.record("create_vm")?;
        *self.target.borrow_mut() = Some(target.clone());
        let mut vm = live_vm(PowerState::PoweredOff);
        vm.moid = "vm-100".to_owned();
        vm.name = spec.name.clone().unwrap_or_default();
        Ok(vm)
    }
    fn reconfigure(&self, _vm: &LiveVm, _spec: &ConfigSpec) -> Result<(), VmwrightError> {
        self.record("reconfigure")
    }
    fn power_off(&self, _vm: &LiveVm) -> Result<(), VmwrightError> {
        self.calls.borrow_mut().push("power_off".to_owned());
        Ok(())
    }
    fn power_on(&self, _vm: &LiveVm) -> Result<(), VmwrightError> {
        self.calls.borrow_mut().push("power_on".to_owned());
        Ok(())
    }
    fn destroy_vm(&self, _vm: &LiveVm) -> Result<(), VmwrightError> {
        self.calls.borrow_mut().push("destroy_vm".to_owned());
        Ok(())
    }
    fn unregister_vm(&self, _vm: &LiveVm) -> Result<(), VmwrightError> {
        self.calls.borrow_mut().push("unregister_vm".to_owned());
        Ok(())
    }
}
