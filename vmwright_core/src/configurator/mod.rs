//! Drive every handler through a request:
//! build and verify, link live devices, stage changes, populate the request.
pub mod builder;
pub mod registry;

// Reexports
pub use builder::HandlerBuilder;
pub use registry::{HandlerBucket, HandlerFactory, HandlerRegistry};

use crate::change_set::ChangeSet;
use crate::handlers::{ControllerPool, HandlerContext, ParameterHandler};
use crate::linker::link_vm_devices;
use crate::params::VmParams;
use crate::services::{DeviceTracker, Directory, ObjectCache, Placement};
use crate::vsphere::{ConfigSpec, LiveVm};

use std::rc::Rc;

// Error Handling
use log::{debug, info, trace};
use miette::Result;
use vmwright_error::VmwrightError;

#[derive(Debug)]
pub struct Configurator {
    params: Rc<VmParams>,
    vm: Option<Rc<LiveVm>>,
    cache: Rc<ObjectCache>,
    placement: Rc<Placement>,
    registry: HandlerRegistry,
    handlers: Vec<Box<dyn ParameterHandler>>,
    tracker: DeviceTracker,
    change_set: ChangeSet,
}

impl Configurator {
    pub fn new(params: VmParams, vm: Option<LiveVm>, directory: Rc<dyn Directory>) -> Self {
        let params = Rc::new(params);
        let vm = vm.map(Rc::new);
        let cache = Rc::new(ObjectCache::new(directory));
        Self {
            change_set: ChangeSet::new(params.clone(), vm.clone()),
            placement: Rc::new(Placement::new(params.clone(), cache.clone())),
            params,
            vm,
            cache,
            registry: HandlerRegistry::with_defaults(),
            handlers: vec![],
            tracker: DeviceTracker::new(),
        }
    }
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn is_new_vm(&self) -> bool {
        self.vm.is_none()
    }
    pub fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }
    pub fn tracker(&self) -> &DeviceTracker {
        &self.tracker
    }
    pub fn handlers(&self) -> &[Box<dyn ParameterHandler>] {
        &self.handlers
    }
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /*
     * Build the active handlers, verify their parameters
     * and link the live devices to the desired objects.
     */
    pub fn prepare_parameter_handlers(&mut self) -> Result<(), VmwrightError> {
        let ctx = HandlerContext {
            params: self.params.clone(),
            vm: self.vm.clone(),
            cache: self.cache.clone(),
            placement: self.placement.clone(),
            controllers: ControllerPool::default(),
        };
        self.handlers = HandlerBuilder::new(&self.registry, ctx).build()?;
        for handler in self.handlers.iter_mut() {
            trace!("[verify] {}", handler.handler_name());
            handler.verify_parameter_constraints()?;
        }
        if let Some(vm) = &self.vm {
            link_vm_devices(vm, &mut self.handlers, &mut self.tracker)?;
        }
        Ok(())
    }

    /// Compare every handler with the live vm and merge their change sets.
    pub fn stage_configuration_changes(&mut self) -> Result<&ChangeSet, VmwrightError> {
        for handler in self.handlers.iter_mut() {
            handler.compare_live_config_with_desired_config()?;
            self.change_set
                .propagate_required_changes_from(handler.change_set());
        }
        self.change_set.objects_to_remove = self.tracker.unlinked_devices().to_vec();
        info!(
            "[stage] changes required: {}, power cycle required: {}",
            self.change_set.are_changes_required(),
            self.change_set.power_cycle_required
        );
        Ok(&self.change_set)
    }

    /*
     * Fill the request with the staged changes.
     * Removals go first, then every handler with changes in registration
     * order, controllers ahead of the devices they carry.
     */
    pub fn apply_staged_changes_to_config_spec(
        &mut self,
        spec: &mut ConfigSpec,
    ) -> Result<(), VmwrightError> {
        for object in self.change_set.objects_to_remove.iter() {
            self.tracker.track_device_id_from_spec(object.clone());
            spec.device_change.push(object.to_removal_spec()?);
        }
        for handler in self.handlers.iter_mut() {
            if !handler.change_set().are_changes_required() {
                continue;
            }
            debug!("[apply] {}", handler.handler_name());
            handler.populate_config_spec_with_parameters(spec, &mut self.tracker)?;
        }
        Ok(())
    }
}
