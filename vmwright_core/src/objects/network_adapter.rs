use super::{
    compare_attributes_for_changes, compare_nested_for_changes, output_map, Comparable,
    DeviceState, LiveLink, Linkable, VsphereObject,
};
use crate::vsphere::{
    AdapterType, AddressType, ConnectInfo, DeviceChange, DeviceKind, NetworkBacking,
    ResourceAllocationInfo, SharesInfo, SharesLevel, VirtualDevice, VirtualEthernetCard,
};

use bon::bon;
use serde_json::{json, Map, Value};

// Error Handling
use miette::Result;
use vmwright_error::{LibError, VmwrightError};

pub const AUTOMATIC_MAC_ADDRESS: &str = "automatic";

/// The network an adapter is plugged into.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Portgroup {
    Distributed { key: String, switch_uuid: String },
    Nsx { opaque_network_id: String },
    Standard { name: String, network: Option<String> },
}
impl Portgroup {
    pub fn from_backing(backing: &NetworkBacking) -> Self {
        match backing {
            NetworkBacking::DistributedPort {
                portgroup_key,
                switch_uuid,
            } => Portgroup::Distributed {
                key: portgroup_key.to_owned(),
                switch_uuid: switch_uuid.to_owned(),
            },
            NetworkBacking::Opaque { opaque_network_id } => Portgroup::Nsx {
                opaque_network_id: opaque_network_id.to_owned(),
            },
            NetworkBacking::Network {
                device_name,
                network,
            } => Portgroup::Standard {
                name: device_name.to_owned(),
                network: network.clone(),
            },
        }
    }
    pub fn to_backing(&self) -> NetworkBacking {
        match self {
            Portgroup::Distributed { key, switch_uuid } => NetworkBacking::DistributedPort {
                portgroup_key: key.to_owned(),
                switch_uuid: switch_uuid.to_owned(),
            },
            Portgroup::Nsx { opaque_network_id } => NetworkBacking::Opaque {
                opaque_network_id: opaque_network_id.to_owned(),
            },
            Portgroup::Standard { name, network } => NetworkBacking::Network {
                device_name: name.to_owned(),
                network: network.clone(),
            },
        }
    }
    fn to_module_output(&self) -> Value {
        match self {
            Portgroup::Distributed { key, switch_uuid } => {
                json!({"key": key, "switch_uuid": switch_uuid})
            }
            Portgroup::Nsx { opaque_network_id } => json!({"opaque_network_id": opaque_network_id}),
            Portgroup::Standard { name, network } => json!({"name": name, "network": network}),
        }
    }
}
impl Comparable for Portgroup {
    fn differs_from(&self, live: &Self) -> bool {
        match (self, live) {
            (
                Portgroup::Distributed { key, switch_uuid },
                Portgroup::Distributed {
                    key: live_key,
                    switch_uuid: live_uuid,
                },
            ) => key != live_key || switch_uuid != live_uuid,
            (
                Portgroup::Nsx { opaque_network_id },
                Portgroup::Nsx {
                    opaque_network_id: live_id,
                },
            ) => opaque_network_id != live_id,
            (
                Portgroup::Standard { name, network },
                Portgroup::Standard {
                    name: live_name,
                    network: live_network,
                },
            ) => name != live_name || compare_attributes_for_changes(network, live_network),
            _ => true,
        }
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct NetworkAdapterResourceAllocation {
    pub shares: Option<i32>,
    pub shares_level: Option<SharesLevel>,
    pub reservation: Option<i64>,
    pub limit: Option<i64>,
}
impl NetworkAdapterResourceAllocation {
    /// None when the user set no allocation field at all.
    pub fn from_params(
        shares: Option<i32>,
        shares_level: Option<SharesLevel>,
        reservation: Option<i64>,
        limit: Option<i64>,
    ) -> Option<Self> {
        let allocation = Self {
            shares,
            shares_level,
            reservation,
            limit,
        };
        match allocation == Self::default() {
            true => None,
            false => Some(allocation),
        }
    }
    pub fn from_live(info: &ResourceAllocationInfo) -> Self {
        let level = info.shares_level();
        Self {
            shares: info.custom_shares(),
            shares_level: level.filter(|e| *e != SharesLevel::Custom),
            reservation: info.reservation,
            limit: info.limit,
        }
    }
    pub fn to_spec(&self) -> ResourceAllocationInfo {
        ResourceAllocationInfo {
            reservation: self.reservation,
            limit: self.limit,
            shares: SharesInfo::from_params(self.shares, self.shares_level),
        }
    }
}
impl Comparable for NetworkAdapterResourceAllocation {
    fn differs_from(&self, live: &Self) -> bool {
        compare_attributes_for_changes(&self.shares, &live.shares)
            || compare_attributes_for_changes(&self.shares_level, &live.shares_level)
            || compare_attributes_for_changes(&self.reservation, &live.reservation)
            || compare_attributes_for_changes(&self.limit, &live.limit)
    }
}

/*
* A virtual network adapter.
* Adapters have no natural key, they are identified by their
* position among the adapters of the vm.
*/
#[derive(Debug)]
pub struct NetworkAdapter {
    /// 1-based position among the vm adapters.
    pub index: usize,
    pub adapter_type: Option<AdapterType>,
    pub portgroup: Option<Portgroup>,
    pub connected: Option<bool>,
    pub connect_at_power_on: Option<bool>,
    pub mac_address: Option<String>,
    pub resource_allocation: Option<NetworkAdapterResourceAllocation>,
    state: DeviceState,
    live: LiveLink<NetworkAdapter>,
}

impl Linkable for NetworkAdapter {
    fn state(&self) -> &DeviceState {
        &self.state
    }
    fn live(&self) -> &LiveLink<Self> {
        &self.live
    }
}

#[bon]
impl NetworkAdapter {
    #[builder]
    pub fn new(
        index: usize,
        portgroup: Portgroup,
        adapter_type: Option<AdapterType>,
        connected: Option<bool>,
        connect_at_power_on: Option<bool>,
        mac_address: Option<String>,
        resource_allocation: Option<NetworkAdapterResourceAllocation>,
    ) -> Self {
        Self {
            index,
            adapter_type,
            portgroup: Some(portgroup),
            connected,
            connect_at_power_on,
            mac_address,
            resource_allocation,
            state: DeviceState::default(),
            live: LiveLink::default(),
        }
    }
}

impl NetworkAdapter {
    pub fn from_live_device(device: &VirtualDevice, index: usize) -> Option<Self> {
        let card = match &device.kind {
            DeviceKind::EthernetCard(card) => card,
            _ => return None,
        };
        let mac_address = match card.address_type {
            Some(AddressType::Generated) => Some(AUTOMATIC_MAC_ADDRESS.to_owned()),
            _ => card.mac_address.clone(),
        };
        Some(Self {
            index,
            adapter_type: Some(card.adapter_type),
            portgroup: card.backing.as_ref().map(Portgroup::from_backing),
            connected: card.connectable.as_ref().and_then(|e| e.connected),
            connect_at_power_on: card.connectable.as_ref().and_then(|e| e.start_connected),
            mac_address,
            resource_allocation: card
                .resource_allocation
                .as_ref()
                .map(NetworkAdapterResourceAllocation::from_live),
            state: DeviceState::from_raw(device),
            live: LiveLink::default(),
        })
    }
    pub fn link_corresponding_live_object(&self, live: NetworkAdapter) -> Result<(), VmwrightError> {
        self.live.link(live, &self.name_as_str())?;
        Ok(())
    }

    /// Options shared by creation and edition.
    fn apply_options(&self, card: &mut VirtualEthernetCard) {
        match self.mac_address.as_deref() {
            Some(AUTOMATIC_MAC_ADDRESS) => {
                card.address_type = Some(AddressType::Generated);
                card.mac_address = None;
            }
            Some(mac) => {
                card.address_type = Some(AddressType::Manual);
                card.mac_address = Some(mac.to_owned());
            }
            None => {}
        }
        let connectable = card.connectable.get_or_insert_with(ConnectInfo::default);
        if let Some(connect) = self.connect_at_power_on {
            connectable.start_connected = Some(connect);
        }
        if let Some(connected) = self.connected {
            connectable.connected = Some(connected);
        }
        if let Some(allocation) = &self.resource_allocation {
            card.resource_allocation = Some(allocation.to_spec());
        }
        if let Some(portgroup) = &self.portgroup {
            card.backing = Some(portgroup.to_backing());
        }
    }
    fn missing_raw_device(&self, action: &str) -> LibError {
        LibError::builder()
            .msg(&format!("{} has no live device to {}", self.name_as_str(), action))
            .help("Only adapters linked to a live device can be edited or removed")
            .build()
    }
}

impl VsphereObject for NetworkAdapter {
    fn name_as_str(&self) -> String {
        format!("Network Adapter {}", self.index)
    }
    fn to_new_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let key = self.key().ok_or_else(|| {
            LibError::builder()
                .msg(&format!("{} has no device key", self.name_as_str()))
                .help("Track the adapter before building its creation request")
                .build()
        })?;
        let mut card = VirtualEthernetCard {
            adapter_type: self.adapter_type.unwrap_or(AdapterType::Vmxnet3),
            backing: None,
            address_type: Some(AddressType::Generated),
            mac_address: None,
            connectable: Some(ConnectInfo::default()),
            resource_allocation: None,
        };
        self.apply_options(&mut card);
        let device = VirtualDevice::new(key, DeviceKind::EthernetCard(card))
            .with_label(&self.name_as_str());
        Ok(DeviceChange::add(device))
    }
    fn to_update_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let mut device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("edit"))?;
        if let DeviceKind::EthernetCard(card) = &mut device.kind {
            self.apply_options(card);
        }
        Ok(DeviceChange::edit(device))
    }
    fn to_removal_spec(&self) -> Result<DeviceChange, VmwrightError> {
        let device = self
            .raw_device()
            .cloned()
            .ok_or_else(|| self.missing_raw_device("remove"))?;
        Ok(DeviceChange::remove(device))
    }
    fn differs_from_live_object(&self) -> bool {
        let live = match self.live.get() {
            Some(live) => live,
            None => return true,
        };
        compare_nested_for_changes(&self.portgroup, &live.portgroup)
            || compare_nested_for_changes(&self.resource_allocation, &live.resource_allocation)
            || compare_attributes_for_changes(&self.mac_address, &live.mac_address)
            || compare_attributes_for_changes(&self.connect_at_power_on, &live.connect_at_power_on)
            || compare_attributes_for_changes(&self.connected, &live.connected)
    }
    fn to_module_output(&self) -> Map<String, Value> {
        let allocation = self.resource_allocation.as_ref();
        output_map([
            ("object_type", json!("network_adapter")),
            ("adapter_type", json!(self.adapter_type)),
            (
                "portgroup",
                self.portgroup
                    .as_ref()
                    .map(|e| e.to_module_output())
                    .unwrap_or(Value::Null),
            ),
            ("connect_at_power_on", json!(self.connect_at_power_on)),
            ("connected", json!(self.connected)),
            ("mac_address", json!(self.mac_address)),
            ("shares", json!(allocation.and_then(|e| e.shares))),
            ("shares_level", json!(allocation.and_then(|e| e.shares_level))),
            ("reservation", json!(allocation.and_then(|e| e.reservation))),
            ("limit", json!(allocation.and_then(|e| e.limit))),
            ("label", json!(self.name_as_str())),
        ])
    }
    fn live_module_output(&self) -> Option<Map<String, Value>> {
        self.live.get().map(|e| e.to_module_output())
    }
    fn has_live_object(&self) -> bool {
        self.live.is_linked()
    }
    fn is_live(&self) -> bool {
        self.state.raw.is_some()
    }
    fn assign_placeholder_key(&self, key: i32) {
        if !self.is_live() && !self.has_live_object() {
            self.state.set_placeholder(key);
        }
    }
}
