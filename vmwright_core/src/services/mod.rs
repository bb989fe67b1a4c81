//! Request scoped services shared by every handler.
pub mod device_tracker;
pub mod directory;
pub mod error_handler;
pub mod object_cache;
pub mod placement;

// Reexports
pub use device_tracker::DeviceTracker;
pub use directory::{
    Cluster, Datastore, DatastoreCluster, Directory, EsxiHost, Folder, InMemoryDirectory, Network,
    ResourcePool,
};
pub use error_handler::translate_backend_error;
pub use object_cache::ObjectCache;
pub use placement::{CreationTarget, Placement};
