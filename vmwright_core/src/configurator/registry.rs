use crate::handlers::{
    CdromHandler, ControllerHandler, CpuHandler, DiskHandler, HandlerContext, MemoryHandler,
    MetadataHandler, NetworkAdapterHandler, NvdimmHandler, ParameterHandler, VmOptionsHandler,
};

use std::fmt;
use strum::{Display, EnumIter};

// Error Handling
use log::trace;
use miette::Result;
use vmwright_error::VmwrightError;

pub type HandlerFactory =
    fn(&HandlerContext) -> Result<Box<dyn ParameterHandler>, VmwrightError>;

/*
* Handlers are built bucket by bucket:
* controllers first, so device handlers can resolve device nodes
* against them.
*/
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum HandlerBucket {
    Controller,
    Device,
    Vm,
}

#[derive(Clone)]
pub struct Registration {
    pub bucket: HandlerBucket,
    pub name: &'static str,
    pub factory: HandlerFactory,
}
impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("bucket", &self.bucket)
            .field("name", &self.name)
            .finish()
    }
}

/// Ordered catalogue of handler factories.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handler the engine ships with.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(HandlerBucket::Controller, "scsi_controller", |ctx| {
                Ok(Box::new(ControllerHandler::scsi(ctx)?))
            })
            .register(HandlerBucket::Controller, "sata_controller", |ctx| {
                Ok(Box::new(ControllerHandler::sata(ctx)?))
            })
            .register(HandlerBucket::Controller, "nvme_controller", |ctx| {
                Ok(Box::new(ControllerHandler::nvme(ctx)?))
            })
            .register(HandlerBucket::Controller, "ide_controller", |ctx| {
                Ok(Box::new(ControllerHandler::ide(ctx)?))
            })
            .register(HandlerBucket::Controller, "usb_controller", |ctx| {
                Ok(Box::new(ControllerHandler::usb(ctx)?))
            })
            .register(HandlerBucket::Device, "disks", |ctx| {
                Ok(Box::new(DiskHandler::new(ctx)?))
            })
            .register(HandlerBucket::Device, "cdroms", |ctx| {
                Ok(Box::new(CdromHandler::new(ctx)?))
            })
            .register(HandlerBucket::Device, "network_adapters", |ctx| {
                Ok(Box::new(NetworkAdapterHandler::new(ctx)?))
            })
            .register(HandlerBucket::Device, "nvdimms", |ctx| {
                Ok(Box::new(NvdimmHandler::new(ctx)?))
            })
            .register(HandlerBucket::Vm, "metadata", |ctx| {
                Ok(Box::new(MetadataHandler::new(ctx)?))
            })
            .register(HandlerBucket::Vm, "cpu", |ctx| Ok(Box::new(CpuHandler::new(ctx)?)))
            .register(HandlerBucket::Vm, "memory", |ctx| {
                Ok(Box::new(MemoryHandler::new(ctx)?))
            })
            .register(HandlerBucket::Vm, "vm_options", |ctx| {
                Ok(Box::new(VmOptionsHandler::new(ctx)?))
            });
        registry
    }

    /*
     * Add a factory at the end of its bucket.
     * A name already registered is replaced in place.
     */
    pub fn register(
        &mut self,
        bucket: HandlerBucket,
        name: &'static str,
        factory: HandlerFactory,
    ) -> &mut Self {
        let registration = Registration {
            bucket,
            name,
            factory,
        };
        match self.registrations.iter_mut().find(|e| e.name == name) {
            Some(existing) => {
                trace!("replacing handler {}", name);
                *existing = registration;
            }
            None => self.registrations.push(registration),
        }
        self
    }

    pub fn bucket(&self, bucket: HandlerBucket) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(move |e| e.bucket == bucket)
    }
    pub fn names(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|e| e.name).collect()
    }
}
