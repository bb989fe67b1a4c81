use bon::bon;
use miette::{Diagnostic, Report};
pub use pipelight_error::{CastError, TomlError};
use serde_json::{json, Map, Value};

use thiserror::Error;

pub const PARAMETER_ERROR: &str = "PARAMETER_ERROR";
pub const POWER_CYCLE_REQUIRED: &str = "POWER_CYCLE_REQUIRED";
pub const DEVICE_CONFIGURATION_ERROR: &str = "DEVICE_CONFIGURATION_ERROR";

#[derive(Debug, Error, Diagnostic)]
pub enum VmwrightError {
    ////////////////////////////////
    // Lib native errors
    #[error(transparent)]
    #[diagnostic(transparent)]
    WrapError(#[from] WrapError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    LibError(#[from] LibError),

    ////////////////////////////////
    // Reconciliation
    #[error(transparent)]
    #[diagnostic(transparent)]
    ParameterError(#[from] ParameterError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PowerCycleError(#[from] PowerCycleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DeviceConfigurationError(#[from] DeviceConfigurationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DeviceLinkError(#[from] DeviceLinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    BackendError(#[from] BackendError),

    ////////////////////////////////
    // Type convertion
    #[error(transparent)]
    #[diagnostic(code(serde::error))]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(toml::error))]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    #[diagnostic(code(vmwright::strum::error))]
    StrumError(#[from] strum::ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CastError(#[from] CastError),

    #[error(transparent)]
    #[diagnostic(code(vmwright::io::error))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(vmwright::uuid::error))]
    UuidError(#[from] uuid::Error),
}

impl VmwrightError {
    /// Machine readable code reported alongside the message.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            VmwrightError::ParameterError(_) => Some(PARAMETER_ERROR),
            VmwrightError::PowerCycleError(_) => Some(POWER_CYCLE_REQUIRED),
            VmwrightError::DeviceConfigurationError(_) => Some(DEVICE_CONFIGURATION_ERROR),
            _ => None,
        }
    }
    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            VmwrightError::ParameterError(e) => Some(&e.parameter_name),
            VmwrightError::PowerCycleError(e) => Some(&e.parameter_name),
            _ => None,
        }
    }
    pub fn details(&self) -> Option<&Value> {
        match self {
            VmwrightError::ParameterError(e) => Some(&e.details),
            VmwrightError::PowerCycleError(e) => Some(&e.details),
            VmwrightError::DeviceConfigurationError(e) => Some(&e.details),
            _ => None,
        }
    }
    /*
     * The report handed back to callers:
     * {error_code, parameter_name, message, details}
     */
    pub fn to_output(&self) -> Value {
        json!({
            "error_code": self.error_code(),
            "parameter_name": self.parameter_name(),
            "message": self.to_string(),
            "details": self.details().cloned().unwrap_or(Value::Object(Map::new())),
        })
    }
}

/**
Invalid or missing user input.
Always fatal, never retried.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(vmwright::parameter::error))]
pub struct ParameterError {
    pub parameter_name: String,
    pub message: String,
    pub details: Value,
    #[help]
    pub help: Option<String>,
}

#[bon]
impl ParameterError {
    #[builder]
    pub fn new(parameter: &str, msg: &str, details: Option<Value>, help: Option<&str>) -> Self {
        Self {
            parameter_name: parameter.to_owned(),
            message: msg.to_owned(),
            details: details.unwrap_or(Value::Object(Map::new())),
            help: help.map(|e| e.to_owned()),
        }
    }
}

/**
A field can only be changed while the vm is powered off,
and the request does not allow cycling the power.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(vmwright::power_cycle::error))]
pub struct PowerCycleError {
    pub parameter_name: String,
    pub message: String,
    pub details: Value,
    #[help]
    pub help: String,
}

#[bon]
impl PowerCycleError {
    #[builder]
    pub fn new(parameter: &str, msg: Option<&str>, details: Option<Value>) -> Self {
        let message = match msg {
            Some(msg) => msg.to_owned(),
            None => format!(
                "Configuring {} is not supported while the VM is powered on.",
                parameter
            ),
        };
        Self {
            parameter_name: parameter.to_owned(),
            message,
            details: details.unwrap_or(Value::Object(Map::new())),
            help: power_state_help("powered off"),
        }
    }
}

impl PowerCycleError {
    /// The vm has to change power state outside of any parameter comparison.
    pub fn for_power_state(state: &str) -> Self {
        Self {
            parameter_name: "allow_power_cycling".to_owned(),
            message: power_state_help(state),
            details: json!({ "desired_power_state": state }),
            help: power_state_help(state),
        }
    }
}

/// Hint appended to every error caused by the vm power state.
pub fn power_state_help(state: &str) -> String {
    format!(
        "VM needs to be {} to make changes. \
        You can allow this module to automatically power cycle the VM with the allow_power_cycling parameter.",
        state
    )
}

/**
The backend refused a device of the submitted request.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(vmwright::device_configuration::error))]
pub struct DeviceConfigurationError {
    pub message: String,
    pub details: Value,
    /// Raw fault text returned by the backend.
    pub fault: String,
}

#[bon]
impl DeviceConfigurationError {
    #[builder]
    pub fn new(msg: &str, fault: &str, details: Option<Value>) -> Self {
        Self {
            message: msg.to_owned(),
            details: details.unwrap_or(Value::Object(Map::new())),
            fault: fault.to_owned(),
        }
    }
}

/**
A desired object can only be linked to a single live device.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{} is already linked to a live device", device)]
#[diagnostic(
    code(vmwright::link::error),
    help("Two live devices share the same identifying key.")
)]
pub struct DeviceLinkError {
    pub device: String,
}

/**
Faults raised by the virtualization backend while running a task.
*/
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    /// The backend rejected the device at the given 1-based position of the change list.
    #[error("{}", message)]
    #[diagnostic(code(vmwright::backend::invalid_device_spec))]
    InvalidDeviceSpec { device_id: usize, message: String },

    #[error("{}", message)]
    #[diagnostic(code(vmwright::backend::invalid_power_state))]
    InvalidPowerState { message: String },

    #[error("{} task failed: {}", action, message)]
    #[diagnostic(code(vmwright::backend::task))]
    Task { action: String, message: String },
}

/**
A config error with help higher origin
Can be recursively chained.
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(vmwright::wrap::error))]
pub struct WrapError {
    pub message: String,
    #[diagnostic_source]
    pub origin: Report,
    #[help]
    pub help: String,
}

#[bon]
impl WrapError {
    #[builder]
    pub fn new(msg: &str, help: &str, origin: Report) -> Self {
        Self {
            message: msg.to_owned(),
            help: help.to_owned(),
            origin,
        }
    }
}

/**
A root cause error with no inner origin
*/
#[derive(Debug, Error, Diagnostic)]
#[error("{}", message)]
#[diagnostic(code(vmwright::lib::error))]
pub struct LibError {
    pub message: String,
    #[help]
    pub help: String,
}

#[bon]
impl LibError {
    #[builder]
    pub fn new(msg: &str, help: &str) -> Self {
        Self {
            message: msg.to_owned(),
            help: help.to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn power_cycle_error_default_message() {
        let err: VmwrightError = PowerCycleError::builder().parameter("cpu.cores").build().into();
        assert_eq!(
            err.to_string(),
            "Configuring cpu.cores is not supported while the VM is powered on."
        );
        assert_eq!(err.error_code(), Some(POWER_CYCLE_REQUIRED));
        assert_eq!(err.parameter_name(), Some("cpu.cores"));
    }

    #[test]
    fn power_state_error_points_at_cycling() {
        let err: VmwrightError = PowerCycleError::for_power_state("powered off").into();
        assert_eq!(
            err.to_string(),
            "VM needs to be powered off to make changes. \
            You can allow this module to automatically power cycle the VM with the allow_power_cycling parameter."
        );
        assert_eq!(err.error_code(), Some(POWER_CYCLE_REQUIRED));
        assert_eq!(err.parameter_name(), Some("allow_power_cycling"));
    }

    #[test]
    fn parameter_error_output() {
        let err: VmwrightError = ParameterError::builder()
            .parameter("memory.size_mb")
            .msg("Memory cannot be decreased once added to a VM.")
            .details(json!({"size_mb": 1024, "current_size_mb": 2048}))
            .build()
            .into();
        assert_eq!(
            err.to_output(),
            json!({
                "error_code": "PARAMETER_ERROR",
                "parameter_name": "memory.size_mb",
                "message": "Memory cannot be decreased once added to a VM.",
                "details": {"size_mb": 1024, "current_size_mb": 2048},
            })
        );
    }

    #[test]
    fn backend_errors_carry_no_code() {
        let err: VmwrightError = BackendError::InvalidPowerState {
            message: "The attempted operation cannot be performed in the current state".to_owned(),
        }
        .into();
        assert_eq!(err.error_code(), None);
        assert_eq!(err.details(), None);
    }
}
