use crate::vsphere::NetworkBacking;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::{CastError, TomlError, VmwrightError};

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Datastore {
    pub moid: String,
    pub name: String,
    /// Free space in bytes.
    #[serde(default)]
    pub free_space: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct DatastoreCluster {
    pub moid: String,
    pub name: String,
    #[serde(default)]
    pub datastores: Vec<Datastore>,
}
impl DatastoreCluster {
    pub fn datastore_with_max_free_space(&self) -> Option<&Datastore> {
        self.datastores.iter().max_by_key(|e| e.free_space)
    }
}

/// A portgroup or logical switch adapters can be plugged into.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Network {
    pub moid: String,
    pub name: String,
    pub backing: NetworkBacking,
}

/// A vm folder, found by its full path "<datacenter>/vm/<path>".
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Folder {
    pub moid: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct ResourcePool {
    pub moid: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Cluster {
    pub moid: String,
    pub name: String,
    /// Root resource pool of the cluster.
    pub resource_pool: ResourcePool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct EsxiHost {
    pub moid: String,
    pub name: String,
}

/*
* Lookup of inventory objects by name or managed object id.
* A lookup can match zero, one or several objects.
*/
pub trait Directory {
    fn find_datastores(&self, name_or_moid: &str) -> Result<Vec<Datastore>, VmwrightError>;
    fn find_datastore_clusters(
        &self,
        name_or_moid: &str,
    ) -> Result<Vec<DatastoreCluster>, VmwrightError>;
    fn find_networks(&self, name_or_moid: &str) -> Result<Vec<Network>, VmwrightError>;
    fn find_folders(&self, path: &str) -> Result<Vec<Folder>, VmwrightError>;
    fn find_clusters(&self, name_or_moid: &str) -> Result<Vec<Cluster>, VmwrightError>;
    fn find_resource_pools(&self, name_or_moid: &str) -> Result<Vec<ResourcePool>, VmwrightError>;
    fn find_esxi_hosts(&self, name_or_moid: &str) -> Result<Vec<EsxiHost>, VmwrightError>;
}

/// A directory held in memory, loadable from toml or json.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct InMemoryDirectory {
    #[serde(default)]
    pub datastores: Vec<Datastore>,
    #[serde(default)]
    pub datastore_clusters: Vec<DatastoreCluster>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub resource_pools: Vec<ResourcePool>,
    #[serde(default)]
    pub esxi_hosts: Vec<EsxiHost>,
}

impl InMemoryDirectory {
    pub fn from_file(path: &str) -> Result<Self, VmwrightError> {
        let string = fs::read_to_string(path)?;
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&string),
            _ => Self::from_toml(&string),
        }
    }
    pub fn from_toml(string: &str) -> Result<Self, VmwrightError> {
        let res = toml::from_str::<Self>(string);
        let item = match res {
            Ok(res) => res,
            Err(e) => {
                let err = CastError::TomlError(TomlError::new(e, string));
                return Err(err.into());
            }
        };
        trace!("{:#?}", item);
        Ok(item)
    }
    pub fn from_json(string: &str) -> Result<Self, VmwrightError> {
        Ok(serde_json::from_str::<Self>(string)?)
    }
}

impl Directory for InMemoryDirectory {
    fn find_datastores(&self, name_or_moid: &str) -> Result<Vec<Datastore>, VmwrightError> {
        Ok(self
            .datastores
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
    fn find_datastore_clusters(
        &self,
        name_or_moid: &str,
    ) -> Result<Vec<DatastoreCluster>, VmwrightError> {
        Ok(self
            .datastore_clusters
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
    fn find_networks(&self, name_or_moid: &str) -> Result<Vec<Network>, VmwrightError> {
        Ok(self
            .networks
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
    fn find_folders(&self, path: &str) -> Result<Vec<Folder>, VmwrightError> {
        let path = path.trim_matches('/');
        Ok(self
            .folders
            .iter()
            .filter(|e| e.path.trim_matches('/') == path || e.moid == path)
            .cloned()
            .collect())
    }
    fn find_clusters(&self, name_or_moid: &str) -> Result<Vec<Cluster>, VmwrightError> {
        Ok(self
            .clusters
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
    fn find_resource_pools(&self, name_or_moid: &str) -> Result<Vec<ResourcePool>, VmwrightError> {
        Ok(self
            .resource_pools
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
    fn find_esxi_hosts(&self, name_or_moid: &str) -> Result<Vec<EsxiHost>, VmwrightError> {
        Ok(self
            .esxi_hosts
            .iter()
            .filter(|e| e.name == name_or_moid || e.moid == name_or_moid)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directory_from_toml() -> miette::Result<()> {
        let toml = r#"
            [[datastores]]
            moid = "datastore-11"
            name = "ds-01"
            free_space = 1024

            [[datastore_clusters]]
            moid = "group-p5"
            name = "dsc-01"

            [[datastore_clusters.datastores]]
            moid = "datastore-21"
            name = "ds-21"
            free_space = 10

            [[datastore_clusters.datastores]]
            moid = "datastore-22"
            name = "ds-22"
            free_space = 2000

            [[networks]]
            moid = "dvportgroup-12"
            name = "VM Network"
            backing = { type = "distributed_port", portgroup_key = "dvportgroup-12", switch_uuid = "50 2a" }

            [[folders]]
            moid = "group-v3"
            path = "/dc-01/vm/"

            [[clusters]]
            moid = "domain-c7"
            name = "cluster-01"
            resource_pool = { moid = "resgroup-8", name = "Resources" }
        "#;
        let directory = InMemoryDirectory::from_toml(toml)?;
        assert_eq!(directory.find_datastores("datastore-11")?.len(), 1);
        assert_eq!(directory.find_datastores("missing")?.len(), 0);

        let clusters = directory.find_datastore_clusters("dsc-01")?;
        let best = clusters[0].datastore_with_max_free_space().unwrap();
        assert_eq!(best.name, "ds-22");

        assert_eq!(directory.find_folders("dc-01/vm")?[0].moid, "group-v3");
        assert_eq!(
            directory.find_clusters("cluster-01")?[0].resource_pool.moid,
            "resgroup-8"
        );

        let networks = directory.find_networks("VM Network")?;
        assert_eq!(
            networks[0].backing,
            NetworkBacking::DistributedPort {
                portgroup_key: "dvportgroup-12".to_owned(),
                switch_uuid: "50 2a".to_owned(),
            }
        );
        Ok(())
    }
}
