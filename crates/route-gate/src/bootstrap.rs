use std::sync::Arc;

use permission_store::{PermissionLoader, PermissionStore};

use crate::auth::{AuthPlugin, CredentialResolver, TokenSources};
use crate::events::{EventsPort, TracingEvents};
use crate::http::GateRouter;
use crate::pipeline::{GateServices, PipelineBuilder};
use crate::schema::{FieldRuleValidator, SchemaValidator};
use crate::scope::{DataAccessFactory, DescriptorFactory, ScopedServiceAttacher};
use crate::trace::GateTracer;

/// Builder for wiring the gate's collaborators into a [`GateRouter`].
#[derive(Clone)]
pub struct GateBootstrap {
    store: Arc<dyn PermissionStore>,
    plugins: Vec<Arc<dyn AuthPlugin>>,
    sources: TokenSources,
    validator: Arc<dyn SchemaValidator>,
    data_access: Arc<dyn DataAccessFactory>,
    events: Arc<dyn EventsPort>,
    tracer: GateTracer,
}

impl GateBootstrap {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            plugins: Vec::new(),
            sources: TokenSources::default(),
            validator: Arc::new(FieldRuleValidator),
            data_access: Arc::new(DescriptorFactory),
            events: Arc::new(TracingEvents),
            tracer: GateTracer::default(),
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn AuthPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_token_sources(mut self, sources: TokenSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_data_access(mut self, factory: Arc<dyn DataAccessFactory>) -> Self {
        self.data_access = factory;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventsPort>) -> Self {
        self.events = events;
        self
    }

    pub fn with_tracer(mut self, tracer: GateTracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn services(&self) -> GateServices {
        let resolver = self
            .plugins
            .iter()
            .cloned()
            .fold(CredentialResolver::new(self.sources.clone()), |resolver, plugin| {
                resolver.with_plugin(plugin)
            });
        GateServices {
            resolver: Arc::new(resolver),
            loader: PermissionLoader::new(Arc::clone(&self.store)),
            validator: Arc::clone(&self.validator),
            attacher: ScopedServiceAttacher::new(Arc::clone(&self.data_access)),
        }
    }

    pub fn pipeline_builder(&self) -> PipelineBuilder {
        PipelineBuilder::new(self.services())
    }

    /// Empty router ready for route registration.
    pub fn build_router(&self) -> GateRouter {
        GateRouter::new(
            self.pipeline_builder(),
            Arc::clone(&self.events),
            self.tracer.clone(),
        )
    }
}
