use super::{
    Cluster, Datastore, DatastoreCluster, Directory, EsxiHost, Folder, Network, ResourcePool,
};

use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// Error Handling
use log::{trace, warn};
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/*
* Memoized directory lookups for the duration of a request.
* Ambiguous lookups keep the first match.
*/
pub struct ObjectCache {
    directory: Rc<dyn Directory>,
    datastores: Memo<Datastore>,
    datastore_clusters: Memo<DatastoreCluster>,
    networks: Memo<Network>,
    folders: Memo<Folder>,
    clusters: Memo<Cluster>,
    resource_pools: Memo<ResourcePool>,
    esxi_hosts: Memo<EsxiHost>,
}

type Memo<T> = RefCell<HashMap<String, Option<T>>>;

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("datastores", &self.datastores)
            .field("datastore_clusters", &self.datastore_clusters)
            .field("networks", &self.networks)
            .field("folders", &self.folders)
            .field("clusters", &self.clusters)
            .field("resource_pools", &self.resource_pools)
            .field("esxi_hosts", &self.esxi_hosts)
            .finish()
    }
}

fn first_of<T>(kind: &str, name: &str, mut items: Vec<T>) -> Option<T> {
    if items.len() > 1 {
        warn!(
            "found {} {} matching {:#?}, using the first one",
            items.len(),
            kind,
            name
        );
    }
    match items.is_empty() {
        true => None,
        false => Some(items.remove(0)),
    }
}

/// Serve a lookup from the memo, asking the directory on a miss.
fn memoized<T, F>(memo: &Memo<T>, kind: &str, name: &str, find: F) -> Result<Option<T>, VmwrightError>
where
    T: Clone,
    F: FnOnce(&str) -> Result<Vec<T>, VmwrightError>,
{
    if let Some(cached) = memo.borrow().get(name) {
        trace!("{} {:#?} served from cache", kind, name);
        return Ok(cached.clone());
    }
    let found = first_of(kind, name, find(name)?);
    memo.borrow_mut().insert(name.to_owned(), found.clone());
    Ok(found)
}

fn not_found(parameter: &str, kind: &str, name: &str) -> VmwrightError {
    ParameterError::builder()
        .parameter(parameter)
        .msg(&format!("Unable to find {} with name or MOID {}", kind, name))
        .details(json!({ "name": name, "object_type": kind }))
        .build()
        .into()
}

impl ObjectCache {
    pub fn new(directory: Rc<dyn Directory>) -> Self {
        Self {
            directory,
            datastores: RefCell::new(HashMap::new()),
            datastore_clusters: RefCell::new(HashMap::new()),
            networks: RefCell::new(HashMap::new()),
            folders: RefCell::new(HashMap::new()),
            clusters: RefCell::new(HashMap::new()),
            resource_pools: RefCell::new(HashMap::new()),
            esxi_hosts: RefCell::new(HashMap::new()),
        }
    }

    pub fn lookup_datastore(&self, name: &str) -> Result<Option<Datastore>, VmwrightError> {
        memoized(&self.datastores, "datastores", name, |e| {
            self.directory.find_datastores(e)
        })
    }
    pub fn lookup_datastore_cluster(
        &self,
        name: &str,
    ) -> Result<Option<DatastoreCluster>, VmwrightError> {
        memoized(&self.datastore_clusters, "datastore clusters", name, |e| {
            self.directory.find_datastore_clusters(e)
        })
    }
    pub fn lookup_network(&self, name: &str) -> Result<Option<Network>, VmwrightError> {
        memoized(&self.networks, "networks", name, |e| {
            self.directory.find_networks(e)
        })
    }

    /// Like lookup_datastore, a missing datastore being a parameter error.
    pub fn get_datastore(&self, parameter: &str, name: &str) -> Result<Datastore, VmwrightError> {
        self.lookup_datastore(name)?
            .ok_or_else(|| not_found(parameter, "datastore", name))
    }
    pub fn get_network(&self, parameter: &str, name: &str) -> Result<Network, VmwrightError> {
        self.lookup_network(name)?
            .ok_or_else(|| not_found(parameter, "network", name))
    }
    pub fn get_folder(&self, parameter: &str, path: &str) -> Result<Folder, VmwrightError> {
        memoized(&self.folders, "folders", path, |e| self.directory.find_folders(e))?
            .ok_or_else(|| not_found(parameter, "folder", path))
    }
    pub fn get_cluster(&self, parameter: &str, name: &str) -> Result<Cluster, VmwrightError> {
        memoized(&self.clusters, "clusters", name, |e| {
            self.directory.find_clusters(e)
        })?
        .ok_or_else(|| not_found(parameter, "cluster", name))
    }
    pub fn get_resource_pool(
        &self,
        parameter: &str,
        name: &str,
    ) -> Result<ResourcePool, VmwrightError> {
        memoized(&self.resource_pools, "resource pools", name, |e| {
            self.directory.find_resource_pools(e)
        })?
        .ok_or_else(|| not_found(parameter, "resource pool", name))
    }
    pub fn get_esxi_host(&self, parameter: &str, name: &str) -> Result<EsxiHost, VmwrightError> {
        memoized(&self.esxi_hosts, "esxi hosts", name, |e| {
            self.directory.find_esxi_hosts(e)
        })?
        .ok_or_else(|| not_found(parameter, "esxi host", name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::InMemoryDirectory;
    use pretty_assertions::assert_eq;

    fn datastore(moid: &str, name: &str) -> Datastore {
        Datastore {
            moid: moid.to_owned(),
            name: name.to_owned(),
            free_space: 0,
        }
    }

    #[test]
    fn ambiguous_lookup_keeps_first() -> miette::Result<()> {
        let directory = InMemoryDirectory {
            datastores: vec![datastore("datastore-1", "ds"), datastore("datastore-2", "ds")],
            ..Default::default()
        };
        let cache = ObjectCache::new(Rc::new(directory));
        assert_eq!(cache.get_datastore("datastore", "ds")?.moid, "datastore-1");
        Ok(())
    }

    #[test]
    fn missing_object_is_a_parameter_error() {
        let cache = ObjectCache::new(Rc::new(InMemoryDirectory::default()));
        let err = cache.get_network("network_adapters", "VM Network").unwrap_err();
        assert_eq!(err.parameter_name(), Some("network_adapters"));
        assert_eq!(
            err.to_string(),
            "Unable to find network with name or MOID VM Network"
        );
    }
}
