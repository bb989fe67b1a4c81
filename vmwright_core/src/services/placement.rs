use super::{Datastore, EsxiHost, Folder, ObjectCache, ResourcePool};
use crate::params::VmParams;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::OnceCell;
use std::rc::Rc;

// Error Handling
use log::debug;
use miette::Result;
use vmwright_error::{ParameterError, VmwrightError};

/// Inventory objects a new vm is created in.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct CreationTarget {
    pub folder: Folder,
    pub resource_pool: ResourcePool,
    pub esxi_host: Option<EsxiHost>,
}

/*
* Full path of a vm folder: "<datacenter>/vm/<folder>".
* A path already rooted at the datacenter is kept as is.
*/
pub fn vm_folder_path(folder: Option<&str>, datacenter: &str) -> String {
    let folder = folder.unwrap_or_default().trim_matches('/');
    if folder.is_empty() {
        format!("{}/vm", datacenter)
    } else if folder == datacenter || folder.starts_with(&format!("{}/", datacenter)) {
        folder.to_owned()
    } else if folder == "vm" || folder.starts_with("vm/") {
        format!("{}/{}", datacenter, folder)
    } else {
        format!("{}/vm/{}", datacenter, folder)
    }
}

/*
* Where a new vm lands.
* The datastore parameter names either a datastore or a datastore
* cluster, in which case the member with the most free space is used.
* The resource pool comes from the resource_pool parameter, else from
* the root pool of the cluster.
*/
#[derive(Debug)]
pub struct Placement {
    params: Rc<VmParams>,
    cache: Rc<ObjectCache>,
    datastore: OnceCell<Option<Datastore>>,
    target: OnceCell<CreationTarget>,
}

impl Placement {
    pub fn new(params: Rc<VmParams>, cache: Rc<ObjectCache>) -> Self {
        Self {
            params,
            cache,
            datastore: OnceCell::new(),
            target: OnceCell::new(),
        }
    }

    pub fn get_creation_target(&self) -> Result<CreationTarget, VmwrightError> {
        if let Some(target) = self.target.get() {
            return Ok(target.clone());
        }
        let datacenter = self.params.datacenter.as_deref().ok_or_else(|| {
            ParameterError::builder()
                .parameter("datacenter")
                .msg("datacenter is a required parameter for VM creation.")
                .build()
        })?;
        let path = vm_folder_path(self.params.folder.as_deref(), datacenter);
        let folder = self.cache.get_folder("folder", &path)?;
        let resource_pool = match (&self.params.resource_pool, &self.params.cluster) {
            (Some(name), _) => self.cache.get_resource_pool("resource_pool", name)?,
            (None, Some(name)) => self.cache.get_cluster("cluster", name)?.resource_pool,
            (None, None) => {
                return Err(ParameterError::builder()
                    .parameter("resource_pool")
                    .msg("resource_pool or cluster is a required parameter for VM creation.")
                    .build()
                    .into())
            }
        };
        let esxi_host = match &self.params.esxi_host {
            Some(name) => Some(self.cache.get_esxi_host("esxi_host", name)?),
            None => None,
        };
        debug!(
            "new vm goes to folder {} in pool {}",
            folder.path, resource_pool.name
        );
        let target = CreationTarget {
            folder,
            resource_pool,
            esxi_host,
        };
        Ok(self.target.get_or_init(|| target).clone())
    }

    /// None when the user gave no datastore.
    pub fn get_datastore(&self) -> Result<Option<Datastore>, VmwrightError> {
        if let Some(datastore) = self.datastore.get() {
            return Ok(datastore.clone());
        }
        let resolved = match &self.params.datastore {
            Some(name) => Some(self.resolve(name)?),
            None => None,
        };
        Ok(self.datastore.get_or_init(|| resolved).clone())
    }

    fn resolve(&self, name: &str) -> Result<Datastore, VmwrightError> {
        if let Some(datastore) = self.cache.lookup_datastore(name)? {
            return Ok(datastore);
        }
        let cluster = self.cache.lookup_datastore_cluster(name)?.ok_or_else(|| {
            ParameterError::builder()
                .parameter("datastore")
                .msg(&format!(
                    "Unable to find datastore or datastore cluster with name or MOID {}",
                    name
                ))
                .details(json!({ "datastore": name }))
                .build()
        })?;
        let datastore = cluster.datastore_with_max_free_space().cloned().ok_or_else(|| {
            ParameterError::builder()
                .parameter("datastore")
                .msg(&format!("Datastore cluster {} has no datastore", cluster.name))
                .details(json!({ "datastore_cluster": cluster.name }))
                .build()
        })?;
        debug!(
            "datastore cluster {} resolved to {}",
            cluster.name, datastore.name
        );
        Ok(datastore)
    }

    /// Path of the new vm files, "[datastore]" letting the backend pick the folder.
    pub fn vm_path_name(&self) -> Result<Option<String>, VmwrightError> {
        Ok(self.get_datastore()?.map(|e| format!("[{}]", e.name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::{Cluster, DatastoreCluster, InMemoryDirectory};
    use pretty_assertions::assert_eq;

    fn placement(datastore: &str) -> Placement {
        let directory = InMemoryDirectory {
            datastore_clusters: vec![DatastoreCluster {
                moid: "group-p5".to_owned(),
                name: "dsc-01".to_owned(),
                datastores: vec![
                    Datastore {
                        moid: "datastore-21".to_owned(),
                        name: "ds-21".to_owned(),
                        free_space: 10,
                    },
                    Datastore {
                        moid: "datastore-22".to_owned(),
                        name: "ds-22".to_owned(),
                        free_space: 2000,
                    },
                ],
            }],
            ..Default::default()
        };
        let params = Rc::new(VmParams {
            datastore: Some(datastore.to_owned()),
            ..Default::default()
        });
        Placement::new(params, Rc::new(ObjectCache::new(Rc::new(directory))))
    }

    #[test]
    fn cluster_resolves_to_most_free_space() -> miette::Result<()> {
        assert_eq!(placement("dsc-01").vm_path_name()?, Some("[ds-22]".to_owned()));
        Ok(())
    }

    fn target_params(folder: Option<&str>, resource_pool: Option<&str>) -> VmParams {
        VmParams {
            datacenter: Some("dc-01".to_owned()),
            folder: folder.map(|e| e.to_owned()),
            cluster: Some("cluster-01".to_owned()),
            resource_pool: resource_pool.map(|e| e.to_owned()),
            ..Default::default()
        }
    }
    fn target_placement(params: VmParams) -> Placement {
        let pool = |moid: &str, name: &str| ResourcePool {
            moid: moid.to_owned(),
            name: name.to_owned(),
        };
        let directory = InMemoryDirectory {
            folders: vec![
                Folder {
                    moid: "group-v3".to_owned(),
                    path: "dc-01/vm".to_owned(),
                },
                Folder {
                    moid: "group-v9".to_owned(),
                    path: "dc-01/vm/web".to_owned(),
                },
            ],
            clusters: vec![Cluster {
                moid: "domain-c7".to_owned(),
                name: "cluster-01".to_owned(),
                resource_pool: pool("resgroup-8", "Resources"),
            }],
            resource_pools: vec![pool("resgroup-20", "gold")],
            ..Default::default()
        };
        Placement::new(Rc::new(params), Rc::new(ObjectCache::new(Rc::new(directory))))
    }

    #[test]
    fn folder_paths() {
        assert_eq!(vm_folder_path(None, "dc-01"), "dc-01/vm");
        assert_eq!(vm_folder_path(Some("web"), "dc-01"), "dc-01/vm/web");
        assert_eq!(vm_folder_path(Some("/dc-01/vm/web/"), "dc-01"), "dc-01/vm/web");
        assert_eq!(vm_folder_path(Some("vm/web"), "dc-01"), "dc-01/vm/web");
    }

    #[test]
    fn cluster_root_pool_is_the_default() -> miette::Result<()> {
        let target = target_placement(target_params(None, None)).get_creation_target()?;
        assert_eq!(target.folder.moid, "group-v3");
        assert_eq!(target.resource_pool.moid, "resgroup-8");
        assert_eq!(target.esxi_host, None);
        Ok(())
    }

    #[test]
    fn resource_pool_wins_over_cluster() -> miette::Result<()> {
        let target =
            target_placement(target_params(Some("web"), Some("gold"))).get_creation_target()?;
        assert_eq!(target.folder.moid, "group-v9");
        assert_eq!(target.resource_pool.moid, "resgroup-20");
        Ok(())
    }

    #[test]
    fn creation_needs_a_pool() {
        let params = VmParams {
            cluster: None,
            ..target_params(None, None)
        };
        let err = target_placement(params).get_creation_target().unwrap_err();
        assert_eq!(err.parameter_name(), Some("resource_pool"));
    }

    #[test]
    fn unknown_host_fails() {
        let params = VmParams {
            esxi_host: Some("esx-99".to_owned()),
            ..target_params(None, None)
        };
        let err = target_placement(params).get_creation_target().unwrap_err();
        assert_eq!(err.to_string(), "Unable to find esxi host with name or MOID esx-99");
    }

    #[test]
    fn unknown_datastore_fails() {
        let err = placement("nowhere").get_datastore().unwrap_err();
        assert_eq!(err.parameter_name(), Some("datastore"));
    }
}
