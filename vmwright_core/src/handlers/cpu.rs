use super::{HandlerContext, ParameterHandler};
use crate::change_set::{ChangeSet, PowerSensitivity};
use crate::params::CpuParams;
use crate::services::DeviceTracker;
use crate::vsphere::{ConfigSpec, LiveVm, ResourceAllocationInfo, SharesInfo};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::{ParameterError, PowerCycleError, VmwrightError};

/*
* Cpu count, topology, hot plug flags and allocation.
*
* A core count change on a running vm can be applied live when the
* matching hot plug capability is already enabled on the vm.
*/
#[derive(Debug)]
pub struct CpuHandler {
    params: CpuParams,
    defined_by_user: bool,
    vm: Option<Rc<LiveVm>>,
    change_set: ChangeSet,
}

impl CpuHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("cpu", ctx.params.cpu.is_some(), true)?;
        Ok(Self {
            params: ctx.params.cpu.clone().unwrap_or_default(),
            defined_by_user,
            vm: ctx.vm.clone(),
            change_set: ctx.new_change_set(),
        })
    }

    fn compare_cores(&mut self) -> Result<(), VmwrightError> {
        let res = self.change_set.check_if_change_is_required(
            "cpu.cores",
            |p| p.cpu.as_ref().and_then(|e| e.cores),
            |vm| vm.config.hardware.num_cpu,
            PowerSensitivity::Recoverable,
        );
        match res {
            Err(VmwrightError::PowerCycleError(_)) => self.recover_core_change(),
            res => res,
        }
    }

    /// Increasing needs hot add, decreasing needs hot remove.
    fn recover_core_change(&mut self) -> Result<(), VmwrightError> {
        let (vm, cores) = match (&self.vm, self.params.cores) {
            (Some(vm), Some(cores)) => (vm.clone(), cores),
            _ => return Ok(()),
        };
        let current_cores = vm.config.hardware.num_cpu.unwrap_or_default();
        let (capability, enabled, direction, flag) = match cores > current_cores {
            true => (
                "cpu_hot_add_enabled",
                vm.config.cpu_hot_add_enabled.unwrap_or(false),
                "increased",
                "add",
            ),
            false => (
                "cpu_hot_remove_enabled",
                vm.config.cpu_hot_remove_enabled.unwrap_or(false),
                "decreased",
                "remove",
            ),
        };
        trace!("cpu.cores {} -> {}, hot {} {}", current_cores, cores, flag, enabled);
        let err = PowerCycleError::builder()
            .parameter("cpu.cores")
            .msg(&format!(
                "CPUs cannot be {} while the VM is powered on, unless CPU hot {} is already enabled.",
                direction, flag
            ))
            .details(json!({
                "cores": cores,
                "current_cores": current_cores,
                capability: enabled,
            }))
            .build();
        self.change_set.recover_power_cycle(enabled, err)
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

impl ParameterHandler for CpuHandler {
    fn handler_name(&self) -> &'static str {
        "cpu"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if self.vm.is_none() && self.params.cores.is_none() {
            return Err(ParameterError::builder()
                .parameter("cpu.cores")
                .msg("cpu.cores attribute is mandatory for VM creation")
                .build()
                .into());
        }
        if let (Some(cores), Some(cores_per_socket)) =
            (self.params.cores, self.params.cores_per_socket)
        {
            if cores_per_socket > 0 && cores % cores_per_socket != 0 {
                return Err(ParameterError::builder()
                    .parameter("cpu.cores_per_socket")
                    .msg("cpu.cores must be a multiple of cpu.cores_per_socket")
                    .details(json!({
                        "cores": cores,
                        "cores_per_socket": cores_per_socket,
                    }))
                    .build()
                    .into());
            }
        }
        if self.params.shares.is_some() && self.params.shares_level.is_some() {
            return Err(ParameterError::builder()
                .parameter("cpu.shares")
                .msg("cpu.shares and cpu.shares_level are mutually exclusive.")
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
        self.compare_cores()?;
        let change_set = &mut self.change_set;
        change_set.check_if_change_is_required(
            "cpu.cores_per_socket",
            |p| p.cpu.as_ref().and_then(|e| e.cores_per_socket),
            |vm| vm.config.hardware.num_cores_per_socket,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "cpu.enable_hot_add",
            |p| p.cpu.as_ref().and_then(|e| e.enable_hot_add),
            |vm| vm.config.cpu_hot_add_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "cpu.enable_hot_remove",
            |p| p.cpu.as_ref().and_then(|e| e.enable_hot_remove),
            |vm| vm.config.cpu_hot_remove_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "cpu.enable_performance_counters",
            |p| p.cpu.as_ref().and_then(|e| e.enable_performance_counters),
            |vm| vm.config.vpmc_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "cpu.shares",
            |p| p.cpu.as_ref().and_then(|e| e.shares),
            |vm| vm.config.cpu_allocation.as_ref().and_then(|e| e.custom_shares()),
            PowerSensitivity::Sensitive,
        )?;
        if self.params.shares.is_none() {
            change_set.check_if_change_is_required(
                "cpu.shares_level",
                |p| p.cpu.as_ref().and_then(|e| e.shares_level),
                |vm| vm.config.cpu_allocation.as_ref().and_then(|e| e.shares_level()),
                PowerSensitivity::Sensitive,
            )?;
        }
        change_set.check_if_change_is_required(
            "cpu.limit",
            |p| p.cpu.as_ref().and_then(|e| e.limit),
            |vm| vm.config.cpu_allocation.as_ref().and_then(|e| e.limit),
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "cpu.reservation",
            |p| p.cpu.as_ref().and_then(|e| e.reservation),
            |vm| vm.config.cpu_allocation.as_ref().and_then(|e| e.reservation),
            PowerSensitivity::Sensitive,
        )?;
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        _tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        spec.num_cpus = self.params.cores;
        spec.num_cores_per_socket = self.params.cores_per_socket;
        spec.cpu_hot_add_enabled = self.params.enable_hot_add;
        spec.cpu_hot_remove_enabled = self.params.enable_hot_remove;
        spec.vpmc_enabled = self.params.enable_performance_counters;
        spec.cpu_allocation = self.allocation();
        Ok(())
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::VmParams;
    use crate::testing::{context, live_vm};
    use crate::vsphere::{PowerState, SharesLevel};
    use pretty_assertions::assert_eq;

    fn params(cpu: CpuParams, allow_power_cycling: bool) -> VmParams {
        VmParams {
            allow_power_cycling,
            cpu: Some(cpu),
            ..Default::default()
        }
    }
    fn cores(cores: i32) -> CpuParams {
        CpuParams {
            cores: Some(cores),
            ..Default::default()
        }
    }
    fn running_vm(hot_add: bool, hot_remove: bool) -> LiveVm {
        let mut vm = live_vm(PowerState::PoweredOn);
        vm.config.cpu_hot_add_enabled = Some(hot_add);
        vm.config.cpu_hot_remove_enabled = Some(hot_remove);
        vm
    }

    #[test]
    fn cores_must_divide_by_cores_per_socket() -> miette::Result<()> {
        let ctx = context(
            params(
                CpuParams {
                    cores: Some(6),
                    cores_per_socket: Some(4),
                    ..Default::default()
                },
                false,
            ),
            None,
        );
        let mut handler = CpuHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(err.to_string(), "cpu.cores must be a multiple of cpu.cores_per_socket");
        Ok(())
    }

    #[test]
    fn creation_requires_cores() -> miette::Result<()> {
        let ctx = context(params(CpuParams::default(), false), None);
        let mut handler = CpuHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(err.to_string(), "cpu.cores attribute is mandatory for VM creation");
        Ok(())
    }

    #[test]
    fn shares_are_exclusive() -> miette::Result<()> {
        let ctx = context(
            params(
                CpuParams {
                    cores: Some(2),
                    shares: Some(2000),
                    shares_level: Some(SharesLevel::Low),
                    ..Default::default()
                },
                false,
            ),
            None,
        );
        let mut handler = CpuHandler::new(&ctx)?;
        assert!(handler.verify_parameter_constraints().is_err());
        Ok(())
    }

    #[test]
    fn increase_without_hot_add() -> miette::Result<()> {
        let ctx = context(params(cores(8), false), Some(running_vm(false, false)));
        let mut handler = CpuHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        let err = handler.compare_live_config_with_desired_config().unwrap_err();
        assert_eq!(err.parameter_name(), Some("cpu.cores"));
        assert_eq!(
            err.to_string(),
            "CPUs cannot be increased while the VM is powered on, unless CPU hot add is already enabled."
        );
        assert_eq!(
            err.details().unwrap(),
            &json!({"cores": 8, "current_cores": 4, "cpu_hot_add_enabled": false})
        );
        Ok(())
    }

    #[test]
    fn increase_with_hot_add() -> miette::Result<()> {
        let ctx = context(params(cores(8), false), Some(running_vm(true, false)));
        let mut handler = CpuHandler::new(&ctx)?;
        handler.compare_live_config_with_desired_config()?;
        assert!(handler.change_set().are_changes_required());
        assert!(!handler.change_set().power_cycle_required);
        Ok(())
    }

    #[test]
    fn decrease_without_hot_remove() -> miette::Result<()> {
        let ctx = context(params(cores(2), false), Some(running_vm(true, false)));
        let mut handler = CpuHandler::new(&ctx)?;
        let err = handler.compare_live_config_with_desired_config().unwrap_err();
        assert_eq!(
            err.to_string(),
            "CPUs cannot be decreased while the VM is powered on, unless CPU hot remove is already enabled."
        );
        Ok(())
    }

    #[test]
    fn decrease_with_power_cycling() -> miette::Result<()> {
        let ctx = context(params(cores(2), true), Some(running_vm(false, false)));
        let mut handler = CpuHandler::new(&ctx)?;
        handler.compare_live_config_with_desired_config()?;
        assert!(handler.change_set().power_cycle_required);
        Ok(())
    }

    #[test]
    fn allocation_is_populated() -> miette::Result<()> {
        let ctx = context(
            params(
                CpuParams {
                    cores: Some(2),
                    shares_level: Some(SharesLevel::High),
                    limit: Some(4000),
                    ..Default::default()
                },
                false,
            ),
            None,
        );
        let mut handler = CpuHandler::new(&ctx)?;
        let mut spec = ConfigSpec::default();
        handler.populate_config_spec_with_parameters(&mut spec, &mut DeviceTracker::new())?;
        assert_eq!(spec.num_cpus, Some(2));
        assert_eq!(
            spec.cpu_allocation,
            Some(ResourceAllocationInfo {
                reservation: None,
                limit: Some(4000),
                shares: Some(SharesInfo {
                    level: SharesLevel::High,
                    shares: None,
                }),
            })
        );
        Ok(())
    }
}
