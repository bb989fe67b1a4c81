use super::{HandlerContext, ParameterHandler};
use crate::change_set::{ChangeSet, PowerSensitivity};
use crate::params::MemoryParams;
use crate::services::DeviceTracker;
use crate::vsphere::{ConfigSpec, LiveVm, ResourceAllocationInfo, SharesInfo};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use miette::Result;
use vmwright_error::{ParameterError, PowerCycleError, VmwrightError};

/*
* Memory size, hot add and allocation.
* Memory only ever grows: a decrease is refused whatever the power state.
*/
#[derive(Debug)]
pub struct MemoryHandler {
    params: MemoryParams,
    defined_by_user: bool,
    vm: Option<Rc<LiveVm>>,
    change_set: ChangeSet,
}

impl MemoryHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("memory", ctx.params.memory.is_some(), true)?;
        Ok(Self {
            params: ctx.params.memory.clone().unwrap_or_default(),
            defined_by_user,
            vm: ctx.vm.clone(),
            change_set: ctx.new_change_set(),
        })
    }

    fn current_size_mb(&self) -> Option<i64> {
        self.vm.as_ref().and_then(|e| e.config.hardware.memory_mb)
    }

    fn compare_size(&mut self) -> Result<(), VmwrightError> {
        let res = self.change_set.check_if_change_is_required(
            "memory.size_mb",
            |p| p.memory.as_ref().and_then(|e| e.size_mb),
            |vm| vm.config.hardware.memory_mb,
            PowerSensitivity::Recoverable,
        );
        match res {
            Err(VmwrightError::PowerCycleError(_)) => {
                let enabled = self
                    .vm
                    .as_ref()
                    .and_then(|e| e.config.memory_hot_add_enabled)
                    .unwrap_or(false);
                let err = PowerCycleError::builder()
                    .parameter("memory.size_mb")
                    .msg("Memory cannot be increased while the VM is powered on, unless memory hot add is already enabled.")
                    .details(json!({
                        "size_mb": self.params.size_mb,
                        "current_size_mb": self.current_size_mb(),
                        "memory_hot_add_enabled": enabled,
                    }))
                    .build();
                self.change_set.recover_power_cycle(enabled, err)
            }
            res => res,
        }
    }

    fn allocation(&self) -> Option<ResourceAllocationInfo> {
        let allocation = ResourceAllocationInfo {
            reservation: self.params.reservation,
            limit: self.params.limit,
            shares: SharesInfo::from_params(self.params.shares, self.params.shares_level),
        };
        match allocation.is_empty() {
            true => None,
            false => Some(allocation),
        }
    }
}

impl ParameterHandler for MemoryHandler {
    fn handler_name(&self) -> &'static str {
        "memory"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if self.vm.is_none() && self.params.size_mb.is_none() {
            return Err(ParameterError::builder()
                .parameter("memory.size_mb")
                .msg("memory.size_mb attribute is mandatory for VM creation")
                .build()
                .into());
        }
        if let (Some(size_mb), Some(current_size_mb)) = (self.params.size_mb, self.current_size_mb())
        {
            if size_mb < current_size_mb {
                return Err(ParameterError::builder()
                    .parameter("memory.size_mb")
                    .msg("Memory cannot be decreased once added to a VM.")
                    .details(json!({
                        "size_mb": size_mb,
                        "current_size_mb": current_size_mb,
                    }))
                    .build()
                    .into());
            }
        }
        if self.params.reserve_all_memory.is_some() && self.params.reservation.is_some() {
            return Err(ParameterError::builder()
                .parameter("memory.reservation")
                .msg("memory.reserve_all_memory and memory.reservation are mutually exclusive.")
                .build()
                .into());
        }
        let size_mb = self.params.size_mb.or(self.current_size_mb());
        if let (Some(reservation), Some(size_mb)) = (self.params.reservation, size_mb) {
            if reservation > size_mb {
                return Err(ParameterError::builder()
                    .parameter("memory.reservation")
                    .msg("Memory reservation cannot be greater than the VM's memory size.")
                    .details(json!({
                        "reservation": reservation,
                        "size_mb": size_mb,
                    }))
                    .build()
                    .into());
            }
        }
        if self.params.shares.is_some() && self.params.shares_level.is_some() {
            return Err(ParameterError::builder()
                .parameter("memory.shares")
                .msg("memory.shares and memory.shares_level are mutually exclusive.")
                .details(json!({
                    "shares": self.params.shares,
                    "shares_level": self.params.shares_level,
                }))
                .build()
                .into());
        }
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        self.compare_size()?;
        let change_set = &mut self.change_set;
        change_set.check_if_change_is_required(
            "memory.enable_hot_add",
            |p| p.memory.as_ref().and_then(|e| e.enable_hot_add),
            |vm| vm.config.memory_hot_add_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "memory.reserve_all_memory",
            |p| p.memory.as_ref().and_then(|e| e.reserve_all_memory),
            |vm| vm.config.memory_reservation_locked_to_max,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "memory.shares",
            |p| p.memory.as_ref().and_then(|e| e.shares),
            |vm| vm.config.memory_allocation.as_ref().and_then(|e| e.custom_shares()),
            PowerSensitivity::Sensitive,
        )?;
        if self.params.shares.is_none() {
            change_set.check_if_change_is_required(
                "memory.shares_level",
                |p| p.memory.as_ref().and_then(|e| e.shares_level),
                |vm| vm.config.memory_allocation.as_ref().and_then(|e| e.shares_level()),
                PowerSensitivity::Sensitive,
            )?;
        }
        change_set.check_if_change_is_required(
            "memory.limit",
            |p| p.memory.as_ref().and_then(|e| e.limit),
            |vm| vm.config.memory_allocation.as_ref().and_then(|e| e.limit),
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "memory.reservation",
            |p| p.memory.as_ref().and_then(|e| e.reservation),
            |vm| vm.config.memory_allocation.as_ref().and_then(|e| e.reservation),
            PowerSensitivity::Sensitive,
        )?;
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        _tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        spec.memory_mb = self.params.size_mb;
        spec.memory_hot_add_enabled = self.params.enable_hot_add;
        spec.memory_reservation_locked_to_max = self.params.reserve_all_memory;
        spec.memory_allocation = self.allocation();
        Ok(())
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
}
