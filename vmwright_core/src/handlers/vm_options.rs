use super::{HandlerContext, ParameterHandler};
use crate::change_set::{ChangeSet, PowerSensitivity};
use crate::params::VmOptionsParams;
use crate::services::DeviceTracker;
use crate::vsphere::{BootFirmware, BootOptions, ConfigSpec, FlagInfo, LiveVm};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

pub const MAX_REMOTE_CONSOLE_SESSIONS: i32 = 40;

/*
* Security, firmware and console options.
*
* Cross field rules are checked against effective values:
* the requested value, else the one found on the live vm.
*/
#[derive(Debug)]
pub struct VmOptionsHandler {
    params: VmOptionsParams,
    defined_by_user: bool,
    vm: Option<Rc<LiveVm>>,
    change_set: ChangeSet,
}

impl VmOptionsHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user =
            ctx.check_params_defined_by_user("vm_options", ctx.params.vm_options.is_some(), false)?;
        Ok(Self {
            params: ctx.params.vm_options.clone().unwrap_or_default(),
            defined_by_user,
            vm: ctx.vm.clone(),
            change_set: ctx.new_change_set(),
        })
    }

    fn effective_firmware(&self) -> Option<BootFirmware> {
        self.params
            .boot_firmware
            .or_else(|| self.vm.as_ref().and_then(|e| e.config.firmware))
    }
    fn effective_secure_boot(&self) -> bool {
        self.params
            .enable_secure_boot
            .or_else(|| {
                self.vm
                    .as_ref()
                    .and_then(|e| e.config.boot_options.as_ref())
                    .and_then(|e| e.efi_secure_boot_enabled)
            })
            .unwrap_or(false)
    }
    fn effective_hardware_virtualization(&self) -> bool {
        self.params
            .enable_hardware_assisted_virtualization
            .or_else(|| self.vm.as_ref().and_then(|e| e.config.nested_hv_enabled))
            .unwrap_or(false)
    }
    fn effective_vbs(&self) -> bool {
        self.params
            .enable_virtual_based_security
            .or_else(|| {
                self.vm
                    .as_ref()
                    .and_then(|e| e.config.flags.as_ref())
                    .and_then(|e| e.vbs_enabled)
            })
            .unwrap_or(false)
    }
    fn effective_encryption(&self) -> bool {
        self.params
            .enable_encryption
            .or_else(|| self.vm.as_ref().and_then(|e| e.config.sev_enabled))
            .unwrap_or(false)
    }

    fn requirement_error(&self, parameter: &str, msg: &str) -> VmwrightError {
        ParameterError::builder()
            .parameter(parameter)
            .msg(msg)
            .details(json!({
                "boot_firmware": self.effective_firmware(),
                "enable_secure_boot": self.effective_secure_boot(),
                "enable_hardware_assisted_virtualization": self.effective_hardware_virtualization(),
            }))
            .build()
            .into()
    }
}

impl ParameterHandler for VmOptionsHandler {
    fn handler_name(&self) -> &'static str {
        "vm_options"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if let Some(sessions) = self.params.maximum_remote_console_sessions {
            if !(0..=MAX_REMOTE_CONSOLE_SESSIONS).contains(&sessions) {
                return Err(ParameterError::builder()
                    .parameter("vm_options.maximum_remote_console_sessions")
                    .msg("Maximum remote console sessions must be between 0 and 40.")
                    .details(json!({ "maximum_remote_console_sessions": sessions }))
                    .build()
                    .into());
            }
        }
        let efi = self.effective_firmware() == Some(BootFirmware::Efi);
        if self.effective_vbs() {
            let parameter = "vm_options.enable_virtual_based_security";
            if !efi {
                return Err(self.requirement_error(
                    parameter,
                    "Virtual based security requires the boot firmware to be efi.",
                ));
            }
            if !self.effective_secure_boot() {
                return Err(self.requirement_error(
                    parameter,
                    "Virtual based security requires secure boot to be enabled.",
                ));
            }
            if !self.effective_hardware_virtualization() {
                return Err(self.requirement_error(
                    parameter,
                    "Virtual based security requires hardware assisted virtualization to be enabled.",
                ));
            }
        }
        if self.effective_encryption() {
            let parameter = "vm_options.enable_encryption";
            if !efi {
                return Err(self.requirement_error(
                    parameter,
                    "Encryption requires the boot firmware to be efi.",
                ));
            }
            if self.effective_secure_boot() {
                return Err(self.requirement_error(
                    parameter,
                    "Encryption requires secure boot to be disabled.",
                ));
            }
        }
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        let change_set = &mut self.change_set;
        change_set.check_if_change_is_required(
            "vm_options.maximum_remote_console_sessions",
            |p| p.vm_options.as_ref().and_then(|e| e.maximum_remote_console_sessions),
            |vm| vm.config.max_mks_connections,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.encrypted_vmotion",
            |p| {
                p.vm_options
                    .as_ref()
                    .and_then(|e| e.encrypted_vmotion)
                    .map(|e| e.to_string())
            },
            |vm| vm.config.migrate_encryption.clone(),
            PowerSensitivity::Insensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.encrypted_fault_tolerance",
            |p| {
                p.vm_options
                    .as_ref()
                    .and_then(|e| e.encrypted_fault_tolerance)
                    .map(|e| e.as_ft_encryption_mode())
            },
            |vm| vm.config.ft_encryption_mode.clone(),
            PowerSensitivity::Insensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.enable_encryption",
            |p| p.vm_options.as_ref().and_then(|e| e.enable_encryption),
            |vm| vm.config.sev_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.enable_hardware_assisted_virtualization",
            |p| {
                p.vm_options
                    .as_ref()
                    .and_then(|e| e.enable_hardware_assisted_virtualization)
            },
            |vm| vm.config.nested_hv_enabled,
            PowerSensitivity::Sensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.enable_io_mmu",
            |p| p.vm_options.as_ref().and_then(|e| e.enable_io_mmu),
            |vm| vm.config.flags.as_ref().and_then(|e| e.vvtd_enabled),
            PowerSensitivity::Insensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.enable_virtual_based_security",
            |p| p.vm_options.as_ref().and_then(|e| e.enable_virtual_based_security),
            |vm| vm.config.flags.as_ref().and_then(|e| e.vbs_enabled),
            PowerSensitivity::Insensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.enable_secure_boot",
            |p| p.vm_options.as_ref().and_then(|e| e.enable_secure_boot),
            |vm| {
                vm.config
                    .boot_options
                    .as_ref()
                    .and_then(|e| e.efi_secure_boot_enabled)
            },
            PowerSensitivity::Insensitive,
        )?;
        change_set.check_if_change_is_required(
            "vm_options.boot_firmware",
            |p| p.vm_options.as_ref().and_then(|e| e.boot_firmware),
            |vm| vm.config.firmware,
            PowerSensitivity::Sensitive,
        )?;
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        _tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        let params = &self.params;
        spec.max_mks_connections = params.maximum_remote_console_sessions;
        spec.migrate_encryption = params.encrypted_vmotion.map(|e| e.to_string());
        spec.ft_encryption_mode = params
            .encrypted_fault_tolerance
            .map(|e| e.as_ft_encryption_mode());
        spec.sev_enabled = params.enable_encryption;
        spec.nested_hv_enabled = params.enable_hardware_assisted_virtualization;
        spec.firmware = params.boot_firmware;
        if params.enable_io_mmu.is_some() || params.enable_virtual_based_security.is_some() {
            spec.flags = Some(FlagInfo {
                vvtd_enabled: params.enable_io_mmu,
                vbs_enabled: params.enable_virtual_based_security,
            });
        }
        if params.enable_secure_boot.is_some() {
            spec.boot_options = Some(BootOptions {
                efi_secure_boot_enabled: params.enable_secure_boot,
            });
        }
        Ok(())
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::{EncryptionMode, VmParams};
    use crate::testing::{context, live_vm};
    use crate::vsphere::PowerState;
    use pretty_assertions::assert_eq;

    fn params(options: VmOptionsParams) -> VmParams {
        VmParams {
            vm_options: Some(options),
            ..Default::default()
        }
    }

    #[test]
    fn console_sessions_range() -> miette::Result<()> {
        let ctx = context(
            params(VmOptionsParams {
                maximum_remote_console_sessions: Some(41),
                ..Default::default()
            }),
            None,
        );
        let mut handler = VmOptionsHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Maximum remote console sessions must be between 0 and 40."
        );
        Ok(())
    }

    #[test]
    fn vbs_uses_live_firmware() -> miette::Result<()> {
        let mut vm = live_vm(PowerState::PoweredOff);
        vm.config.firmware = Some(BootFirmware::Bios);
        let ctx = context(
            params(VmOptionsParams {
                enable_virtual_based_security: Some(true),
                enable_secure_boot: Some(true),
                enable_hardware_assisted_virtualization: Some(true),
                ..Default::default()
            }),
            Some(vm),
        );
        let mut handler = VmOptionsHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Virtual based security requires the boot firmware to be efi."
        );
        Ok(())
    }

    #[test]
    fn encryption_refuses_secure_boot() -> miette::Result<()> {
        let ctx = context(
            params(VmOptionsParams {
                enable_encryption: Some(true),
                enable_secure_boot: Some(true),
                boot_firmware: Some(BootFirmware::Efi),
                ..Default::default()
            }),
            None,
        );
        let mut handler = VmOptionsHandler::new(&ctx)?;
        let err = handler.verify_parameter_constraints().unwrap_err();
        assert_eq!(err.to_string(), "Encryption requires secure boot to be disabled.");
        Ok(())
    }

    #[test]
    fn encryption_modes_are_compared_by_backend_name() -> miette::Result<()> {
        let mut vm = live_vm(PowerState::PoweredOn);
        vm.config.migrate_encryption = Some("opportunistic".to_owned());
        vm.config.ft_encryption_mode = Some("ftEncryptionOpportunistic".to_owned());
        let ctx = context(
            params(VmOptionsParams {
                encrypted_vmotion: Some(EncryptionMode::Opportunistic),
                encrypted_fault_tolerance: Some(EncryptionMode::Required),
                ..Default::default()
            }),
            Some(vm),
        );
        let mut handler = VmOptionsHandler::new(&ctx)?;
        handler.verify_parameter_constraints()?;
        handler.compare_live_config_with_desired_config()?;
        let changed = &handler.change_set().changed_parameters;
        assert_eq!(changed.len(), 1);
        assert_eq!(
            changed["vm_options.encrypted_fault_tolerance"],
            json!({"old_value": "ftEncryptionOpportunistic", "new_value": "ftEncryptionRequired"})
        );
        Ok(())
    }

    #[test]
    fn firmware_change_needs_power_cycle() -> miette::Result<()> {
        let ctx = context(
            params(VmOptionsParams {
                boot_firmware: Some(BootFirmware::Efi),
                ..Default::default()
            }),
            Some(live_vm(PowerState::PoweredOn)),
        );
        let mut handler = VmOptionsHandler::new(&ctx)?;
        let err = handler.compare_live_config_with_desired_config().unwrap_err();
        assert_eq!(err.parameter_name(), Some("vm_options.boot_firmware"));
        Ok(())
    }
}
