//! Declarative reconciliation of a virtual machine configuration.
//!
//! A request (`VmParams`) is compared with the live vm, and the differences are
//! turned into a single backend configuration spec.

pub mod change_set;
pub mod configurator;
pub mod handlers;
pub mod linker;
pub mod objects;
pub mod params;
pub mod services;
pub mod utils;
pub mod vm;
pub mod vsphere;

#[cfg(test)]
pub(crate) mod testing;

pub use configurator::Configurator;
pub use params::{VmParams, VmState};
pub use vm::{VmBackend, VmModule, VmReport, VmSummary};
