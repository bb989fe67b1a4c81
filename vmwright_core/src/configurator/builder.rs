use super::registry::{HandlerBucket, HandlerRegistry};
use crate::handlers::{ControllerPool, HandlerContext, ParameterHandler};

// Error Handling
use log::{debug, trace};
use miette::Result;
use vmwright_error::VmwrightError;

/*
* Instantiate the registered handlers for a request.
*
* Controller handlers are built first and their controllers handed to
* every other handler through the context.
* Handlers the user gave no parameters to are dropped.
*/
#[derive(Debug)]
pub struct HandlerBuilder<'a> {
    registry: &'a HandlerRegistry,
    ctx: HandlerContext,
}

impl<'a> HandlerBuilder<'a> {
    pub fn new(registry: &'a HandlerRegistry, ctx: HandlerContext) -> Self {
        Self { registry, ctx }
    }

    pub fn build(mut self) -> Result<Vec<Box<dyn ParameterHandler>>, VmwrightError> {
        let mut handlers = vec![];

        let mut controllers = vec![];
        for registration in self.registry.bucket(HandlerBucket::Controller) {
            let handler = (registration.factory)(&self.ctx)?;
            controllers.extend(handler.managed_controllers());
            Self::keep_if_defined(&mut handlers, handler);
        }
        trace!("{} controllers available to devices", controllers.len());
        self.ctx.controllers = ControllerPool::new(controllers);

        for bucket in [HandlerBucket::Device, HandlerBucket::Vm] {
            for registration in self.registry.bucket(bucket) {
                let handler = (registration.factory)(&self.ctx)?;
                Self::keep_if_defined(&mut handlers, handler);
            }
        }
        debug!(
            "active handlers: {:?}",
            handlers.iter().map(|e| e.handler_name()).collect::<Vec<_>>()
        );
        Ok(handlers)
    }

    fn keep_if_defined(
        handlers: &mut Vec<Box<dyn ParameterHandler>>,
        handler: Box<dyn ParameterHandler>,
    ) {
        match handler.params_defined_by_user() {
            true => handlers.push(handler),
            false => trace!("{} has no parameters, skipped", handler.handler_name()),
        }
    }
}
