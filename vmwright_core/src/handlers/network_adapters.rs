use super::{
    classify_objects, populate_device_changes, DeviceLinkedHandler, HandlerContext,
    ParameterHandler,
};
use crate::change_set::ChangeSet;
use crate::objects::{
    NetworkAdapter, NetworkAdapterResourceAllocation, Portgroup, VsphereObject,
};
use crate::params::NetworkAdapterParams;
use crate::services::{DeviceTracker, ObjectCache};
use crate::vsphere::{ConfigSpec, DeviceKind, VirtualDevice};

use serde_json::json;
use std::rc::Rc;

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/*
* Network adapters.
* Adapters are matched to live cards by their position on the vm.
*/
#[derive(Debug)]
pub struct NetworkAdapterHandler {
    params: Vec<NetworkAdapterParams>,
    defined_by_user: bool,
    remove_unmanaged: bool,
    cache: Rc<ObjectCache>,
    adapters: Vec<Rc<NetworkAdapter>>,
    /// Live cards seen so far by the linker.
    live_count: usize,
    change_set: ChangeSet,
}

impl NetworkAdapterHandler {
    pub fn new(ctx: &HandlerContext) -> Result<Self, VmwrightError> {
        let defined_by_user = ctx.check_params_defined_by_user(
            "network_adapters",
            ctx.params.network_adapters.is_some(),
            true,
        )?;
        Ok(Self {
            params: ctx.params.network_adapters.clone().unwrap_or_default(),
            defined_by_user,
            remove_unmanaged: ctx.params.network_adapters_remove_unmanaged,
            cache: ctx.cache.clone(),
            adapters: vec![],
            live_count: 0,
            change_set: ctx.new_change_set(),
        })
    }

    fn parse_adapter(
        &self,
        index: usize,
        param: &NetworkAdapterParams,
    ) -> Result<NetworkAdapter, VmwrightError> {
        if param.shares.is_some() && param.shares_level.is_some() {
            return Err(ParameterError::builder()
                .parameter("network_adapters")
                .msg("Only one of shares or shares_level can be set for a network adapter.")
                .details(json!({
                    "network": param.network,
                    "shares": param.shares,
                    "shares_level": param.shares_level,
                }))
                .build()
                .into());
        }
        let network = self.cache.get_network("network_adapters", &param.network)?;
        trace!("{} resolved to {}", param.network, network.moid);
        Ok(NetworkAdapter::builder()
            .index(index)
            .portgroup(Portgroup::from_backing(&network.backing))
            .maybe_adapter_type(param.adapter_type)
            .maybe_connected(param.connected)
            .maybe_connect_at_power_on(param.connect_at_power_on)
            .maybe_mac_address(param.mac_address.clone())
            .maybe_resource_allocation(NetworkAdapterResourceAllocation::from_params(
                param.shares,
                param.shares_level,
                param.reservation,
                param.limit,
            ))
            .build())
    }
}

impl ParameterHandler for NetworkAdapterHandler {
    fn handler_name(&self) -> &'static str {
        "network_adapters"
    }
    fn params_defined_by_user(&self) -> bool {
        self.defined_by_user
    }

    fn verify_parameter_constraints(&mut self) -> Result<(), VmwrightError> {
        if !self.adapters.is_empty() {
            return Ok(());
        }
        let mut adapters = vec![];
        for (i, param) in self.params.iter().enumerate() {
            adapters.push(Rc::new(self.parse_adapter(i + 1, param)?));
        }
        self.adapters = adapters;
        Ok(())
    }

    fn compare_live_config_with_desired_config(&mut self) -> Result<(), VmwrightError> {
        classify_objects(&mut self.change_set, &self.adapters);
        debug!(
            "network_adapters: {} to add, {} to update",
            self.change_set.objects_to_add.len(),
            self.change_set.objects_to_update.len()
        );
        Ok(())
    }

    fn populate_config_spec_with_parameters(
        &mut self,
        spec: &mut ConfigSpec,
        tracker: &mut DeviceTracker,
    ) -> Result<(), VmwrightError> {
        populate_device_changes(&self.change_set, spec, tracker)
    }

    fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
    fn as_device_linked(&mut self) -> Option<&mut dyn DeviceLinkedHandler> {
        Some(self)
    }
}

impl DeviceLinkedHandler for NetworkAdapterHandler {
    fn claims_device(&self, device: &VirtualDevice) -> bool {
        matches!(device.kind, DeviceKind::EthernetCard(_))
    }
    fn link_vm_device(
        &mut self,
        device: &VirtualDevice,
    ) -> Result<Option<Rc<dyn VsphereObject>>, VmwrightError> {
        let live = match NetworkAdapter::from_live_device(device, self.live_count + 1) {
            Some(live) => live,
            None => return Ok(None),
        };
        self.live_count += 1;
        match self.adapters.iter().find(|e| !e.has_live_object()) {
            Some(adapter) => {
                adapter.link_corresponding_live_object(live)?;
                Ok(None)
            }
            None => Ok(Some(Rc::new(live))),
        }
    }
    fn remove_unmanaged(&self) -> bool {
        self.remove_unmanaged
    }
}
