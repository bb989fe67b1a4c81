use crate::handlers::ParameterHandler;
use crate::services::DeviceTracker;
use crate::vsphere::LiveVm;

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::VmwrightError;

/*
* Match the live devices of a vm with the desired objects of the handlers.
*
* Handlers are walked in order and each one sees every device it claims,
* so controllers, registered first, are linked before the devices that
* reference them.
* Devices no active handler claims are out of scope and left alone.
* Claimed devices matching nothing are removal candidates, unless the
* handler keeps its unmanaged devices.
*/
pub fn link_vm_devices(
    vm: &LiveVm,
    handlers: &mut [Box<dyn ParameterHandler>],
    tracker: &mut DeviceTracker,
) -> Result<(), VmwrightError> {
    for handler in handlers.iter_mut() {
        let name = handler.handler_name();
        let handler = match handler.as_device_linked() {
            Some(handler) => handler,
            None => continue,
        };
        let claimed: Vec<_> = vm
            .devices()
            .iter()
            .filter(|e| handler.claims_device(e))
            .collect();
        for device in claimed {
            match handler.link_vm_device(device)? {
                None => trace!("[link] {} device {} linked", name, device.key),
                Some(unmanaged) if handler.remove_unmanaged() => {
                    debug!("[link] {} is unmanaged, marked for removal", unmanaged.name_as_str());
                    tracker.track_unlinked_device(unmanaged);
                }
                Some(unmanaged) => {
                    debug!("[link] {} is unmanaged, left untouched", unmanaged.name_as_str());
                }
            }
        }
    }
    Ok(())
}
