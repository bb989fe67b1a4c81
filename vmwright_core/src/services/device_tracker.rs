use crate::objects::VsphereObject;

use std::rc::Rc;

// Error Handling
use log::trace;

/*
* Position of every device submitted in a request.
*
* The backend cites faulty devices by their 1-based position in the
* change list, the same position doubles as the placeholder key of
* devices created by the request.
*/
#[derive(Debug, Default)]
pub struct DeviceTracker {
    tracked: Vec<Rc<dyn VsphereObject>>,
    unlinked: Vec<Rc<dyn VsphereObject>>,
}

impl DeviceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device to the change list order and return its 1-based id.
    pub fn track_device_id_from_spec(&mut self, device: Rc<dyn VsphereObject>) -> usize {
        self.tracked.push(device.clone());
        let id = self.tracked.len();
        device.assign_placeholder_key(-(id as i32));
        trace!("tracking {} as device {}", device.name_as_str(), id);
        id
    }

    pub fn translate_device_id_to_device(&self, id: usize) -> Option<&Rc<dyn VsphereObject>> {
        match id {
            0 => None,
            _ => self.tracked.get(id - 1),
        }
    }

    /// Live device of a managed type that no desired object claimed.
    pub fn track_unlinked_device(&mut self, device: Rc<dyn VsphereObject>) {
        trace!("unlinked live device {}", device.name_as_str());
        self.unlinked.push(device);
    }
    pub fn unlinked_devices(&self) -> &[Rc<dyn VsphereObject>] {
        &self.unlinked
    }
    pub fn tracked_devices(&self) -> &[Rc<dyn VsphereObject>] {
        &self.tracked
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::objects::{Controller, ControllerModel, Linkable};
    use pretty_assertions::assert_eq;

    #[test]
    fn position_is_placeholder() -> miette::Result<()> {
        let mut tracker = DeviceTracker::new();
        let first = Rc::new(Controller::new(0, ControllerModel::Sata));
        let second = Rc::new(Controller::new(1, ControllerModel::Sata));
        assert_eq!(tracker.track_device_id_from_spec(first.clone()), 1);
        assert_eq!(tracker.track_device_id_from_spec(second.clone()), 2);
        assert_eq!(Linkable::key(first.as_ref()), Some(-1));
        assert_eq!(Linkable::key(second.as_ref()), Some(-2));

        let found = tracker.translate_device_id_to_device(2).unwrap();
        assert_eq!(found.name_as_str(), "SATA Controller 1");
        assert!(tracker.translate_device_id_to_device(0).is_none());
        assert!(tracker.translate_device_id_to_device(3).is_none());
        Ok(())
    }
}
