use super::DeviceTracker;

use serde_json::json;

// Error Handling
use log::{debug, error};
use vmwright_error::{BackendError, DeviceConfigurationError, VmwrightError};

pub const GENERIC_DEVICE_ERROR: &str =
    "A device has an invalid configuration, so the VM cannot be configured.";

/*
* Turn a backend fault into the error reported to the user.
*
* Faults citing a device position are resolved through the tracker
* into the human name of the device. An unknown position falls back
* to a generic message.
* Other errors pass through untouched.
*/
pub fn translate_backend_error(tracker: &DeviceTracker, err: VmwrightError) -> VmwrightError {
    let (device_id, message) = match &err {
        VmwrightError::BackendError(BackendError::InvalidDeviceSpec { device_id, message }) => {
            (*device_id, message.to_owned())
        }
        _ => return err,
    };
    error!("backend refused device {}: {}", device_id, message);

    let device = match tracker.translate_device_id_to_device(device_id) {
        Some(device) => device,
        None => {
            debug!("device {} is not part of the tracked request", device_id);
            return DeviceConfigurationError::builder()
                .msg(GENERIC_DEVICE_ERROR)
                .fault(&message)
                .details(json!({ "error_message": message }))
                .build()
                .into();
        }
    };
    let is_in_sync = device.has_live_object() && !device.differs_from_live_object();
    DeviceConfigurationError::builder()
        .msg(&format!(
            "Device {} (device {} in the VM spec) has an invalid configuration. \
            Please check the device configuration and try again.",
            device.name_as_str(),
            device_id
        ))
        .fault(&message)
        .details(json!({
            "device_is_being_added": !device.is_live() && !device.has_live_object(),
            "device_is_being_removed": device.is_live(),
            "device_is_in_sync": is_in_sync,
            "error_message": message,
        }))
        .build()
        .into()
}
