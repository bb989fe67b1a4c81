pub mod cdrom;
pub mod controller;
pub mod disk;
pub mod network_adapter;
pub mod nvdimm;

// Reexports
pub use cdrom::Cdrom;
pub use controller::{Controller, ControllerCategory, ControllerModel};
pub use disk::Disk;
pub use network_adapter::{NetworkAdapter, NetworkAdapterResourceAllocation, Portgroup};
pub use nvdimm::{Nvdimm, NvdimmController};

use crate::vsphere::{DeviceChange, VirtualDevice};

use serde_json::{Map, Value};
use std::cell::{Cell, OnceCell};
use std::fmt;

// Error Handling
use miette::Result;
use vmwright_error::{DeviceLinkError, VmwrightError};

/*
* Capability set shared by every configurable vm sub-resource.
*
* Objects come in two flavors:
* - desired: parsed from user parameters, optionally linked to a live counterpart,
* - live: built from a device returned by the backend.
*/
pub trait VsphereObject: fmt::Debug {
    /// Human readable name, used in reports and error messages.
    fn name_as_str(&self) -> String;

    /// Creation request, carrying the placeholder key assigned by the tracker.
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError>;
    /// Edit request reusing the backend's own device.
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError>;
    /// Removal request for a live flavored object.
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError>;

    /// True when unlinked, else when any user set field differs from the live counterpart.
    fn differs_from_live_object(&self) -> bool;

    fn to_module_output(&self) -> Map<String, Value>;
    /// Output of the linked live counterpart.
    fn live_module_output(&self) -> Option<Map<String, Value>>;

    fn has_live_object(&self) -> bool;
    /// Whether the object was built from a live device.
    fn is_live(&self) -> bool;

    fn assign_placeholder_key(&self, key: i32);
}

/*
* Holds at most one live counterpart.
* A second link is refused.
*/
#[derive(Debug)]
pub struct LiveLink<T> {
    cell: OnceCell<Box<T>>,
}
impl<T> Default for LiveLink<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}
impl<T> LiveLink<T> {
    pub fn link(&self, live: T, name: &str) -> Result<(), DeviceLinkError> {
        self.cell.set(Box::new(live)).map_err(|_| DeviceLinkError {
            device: name.to_owned(),
        })
    }
    pub fn get(&self) -> Option<&T> {
        self.cell.get().map(|e| e.as_ref())
    }
    pub fn is_linked(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Raw backend device and request scoped key of an object.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub raw: Option<VirtualDevice>,
    placeholder: Cell<Option<i32>>,
}
impl DeviceState {
    pub fn from_raw(device: &VirtualDevice) -> Self {
        Self {
            raw: Some(device.to_owned()),
            placeholder: Cell::new(None),
        }
    }
    pub fn raw_key(&self) -> Option<i32> {
        self.raw.as_ref().map(|e| e.key)
    }
    pub fn placeholder(&self) -> Option<i32> {
        self.placeholder.get()
    }
    pub fn set_placeholder(&self, key: i32) {
        self.placeholder.set(Some(key));
    }
}

/// Objects that carry a device state and may be linked to a live twin.
pub trait Linkable: Sized {
    fn state(&self) -> &DeviceState;
    fn live(&self) -> &LiveLink<Self>;

    /// Backend key when known, else the placeholder assigned for this request.
    fn key(&self) -> Option<i32> {
        self.state()
            .raw_key()
            .or_else(|| self.live().get().and_then(|e| e.state().raw_key()))
            .or_else(|| self.state().placeholder())
    }
    fn raw_device(&self) -> Option<&VirtualDevice> {
        self.state()
            .raw
            .as_ref()
            .or_else(|| self.live().get().and_then(|e| e.state().raw.as_ref()))
    }
}

/*
* The comparison rule for a single attribute:
* - unset desired value: never a change,
* - set desired value, missing live value: a change,
* - otherwise plain inequality.
*/
pub fn compare_attributes_for_changes<T: PartialEq>(desired: &Option<T>, live: &Option<T>) -> bool {
    match (desired, live) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(desired), Some(live)) => desired != live,
    }
}

/// Nested objects compared with the same rule, field by field.
pub trait Comparable {
    fn differs_from(&self, live: &Self) -> bool;
}

pub fn compare_nested_for_changes<T: Comparable>(desired: &Option<T>, live: &Option<T>) -> bool {
    match (desired, live) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(desired), Some(live)) => desired.differs_from(live),
    }
}

/*
* Report of an object as {new_value, old_value}.
* Keys with a null desired value are dropped from both sides.
*/
pub fn to_change_set_output(object: &dyn VsphereObject) -> Value {
    let mut new_value = object.to_module_output();
    let mut old_value = object.live_module_output().unwrap_or_default();
    let nulls: Vec<String> = new_value
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.to_owned())
        .collect();
    for key in nulls {
        new_value.remove(&key);
        old_value.remove(&key);
    }
    let mut map = Map::new();
    map.insert("new_value".to_owned(), Value::Object(new_value));
    map.insert("old_value".to_owned(), Value::Object(old_value));
    Value::Object(map)
}

/// Build a json object from (key, value) pairs.
pub(crate) fn output_map<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unset_desired_is_never_a_change() {
        assert!(!compare_attributes_for_changes::<i32>(&None, &None));
        assert!(!compare_attributes_for_changes(&None, &Some(4)));
    }

    #[test]
    fn missing_live_is_a_change() {
        assert!(compare_attributes_for_changes(&Some(4), &None));
    }

    #[test]
    fn plain_inequality() {
        assert!(compare_attributes_for_changes(&Some(4), &Some(2)));
        assert!(!compare_attributes_for_changes(&Some("thin"), &Some("thin")));
    }

    #[test]
    fn link_only_once() {
        let link: LiveLink<u32> = LiveLink::default();
        assert!(!link.is_linked());
        assert!(link.link(1, "first").is_ok());
        let err = link.link(2, "first").unwrap_err();
        assert_eq!(err.to_string(), "first is already linked to a live device");
        assert_eq!(link.get(), Some(&1));
    }
}
