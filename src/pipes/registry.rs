//! Lookup from `use` identifiers to pipe implementations

use crate::core::PipeConfig;
use crate::pipes::{
    AddNoteHandler, CompositeHandler, ExpressionHandler, FetchTicketsHandler, Pipe, PipeError,
    PipeHandler, UpdateTicketHandler,
};
use crate::plugin::ServiceRegistry;
use crate::template::TemplateRenderer;
use crate::ticket::TicketSystem;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the handler for one pipe configuration
///
/// Runs once per pipe construction. The factory gives access to services
/// and lets composites build their children.
pub type PipeConstructor =
    Arc<dyn Fn(&PipeConfig, &PipeFactory) -> Result<Arc<dyn PipeHandler>, PipeError> + Send + Sync>;

/// A pipe type contributed by a plugin
#[derive(Clone)]
pub struct PipeRegistration {
    pub uses: String,
    pub constructor: PipeConstructor,
}

impl PipeRegistration {
    pub fn new<F>(uses: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&PipeConfig, &PipeFactory) -> Result<Arc<dyn PipeHandler>, PipeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            uses: uses.into(),
            constructor: Arc::new(constructor),
        }
    }
}

impl std::fmt::Debug for PipeRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRegistration")
            .field("uses", &self.uses)
            .finish()
    }
}

/// Table of known pipe types
#[derive(Clone, Default)]
pub struct PipeRegistry {
    constructors: HashMap<String, PipeConstructor>,
}

impl PipeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in pipe types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PipeRegistration::new("composite", |_, factory| {
            Ok(Arc::new(CompositeHandler::new(factory.clone())) as Arc<dyn PipeHandler>)
        }));
        registry.register(PipeRegistration::new("expression", |config, factory| {
            Ok(Arc::new(ExpressionHandler::from_config(config, factory)?) as Arc<dyn PipeHandler>)
        }));
        registry.register(PipeRegistration::new("fetch_tickets", |_, factory| {
            Ok(Arc::new(FetchTicketsHandler::new(factory.services().clone())) as Arc<dyn PipeHandler>)
        }));
        registry.register(PipeRegistration::new("update_ticket", |_, factory| {
            Ok(Arc::new(UpdateTicketHandler::new(factory.services().clone())) as Arc<dyn PipeHandler>)
        }));
        registry.register(PipeRegistration::new("add_note", |_, factory| {
            Ok(Arc::new(AddNoteHandler::new(factory.services().clone())) as Arc<dyn PipeHandler>)
        }));
        registry
    }

    /// Register a pipe type, returning `true` if it replaced an earlier one
    pub fn register(&mut self, registration: PipeRegistration) -> bool {
        self.constructors
            .insert(registration.uses, registration.constructor)
            .is_some()
    }

    pub fn contains(&self, uses: &str) -> bool {
        self.constructors.contains_key(uses)
    }

    pub fn get(&self, uses: &str) -> Option<&PipeConstructor> {
        self.constructors.get(uses)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for PipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRegistry")
            .field("types", &self.types())
            .finish()
    }
}

/// Everything needed to turn a [`PipeConfig`] into a [`Pipe`]
#[derive(Clone)]
pub struct PipeFactory {
    registry: Arc<PipeRegistry>,
    services: Arc<ServiceRegistry>,
    renderer: Arc<TemplateRenderer>,
}

impl PipeFactory {
    pub fn new(
        registry: Arc<PipeRegistry>,
        services: Arc<ServiceRegistry>,
        renderer: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            registry,
            services,
            renderer,
        }
    }

    /// Build a pipe from its configuration
    pub fn build(&self, config: &PipeConfig) -> Result<Pipe, PipeError> {
        let constructor = self
            .registry
            .get(&config.uses)
            .ok_or_else(|| PipeError::UnknownPipeType(config.uses.clone()))?;
        let handler = constructor(config, self)?;
        Ok(Pipe::new(config.clone(), handler, Arc::clone(&self.renderer)))
    }

    pub fn registry(&self) -> &Arc<PipeRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn renderer(&self) -> &Arc<TemplateRenderer> {
        &self.renderer
    }

    /// Resolve a ticket system service by id
    pub fn ticket_system(&self, id: &str) -> Result<Arc<dyn TicketSystem>, PipeError> {
        self.services.ticket_system(id)
    }
}

impl std::fmt::Debug for PipeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeFactory")
            .field("registry", &self.registry)
            .field("services", &self.services.ids())
            .finish()
    }
}
