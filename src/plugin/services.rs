//! Named services injected into pipes

use crate::core::ServiceConfig;
use crate::pipes::PipeError;
use crate::plugin::PluginError;
use crate::ticket::{InMemoryTicketSystem, TicketSystem, UnifiedTicket};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a service instance from its configuration
pub type ServiceConstructor =
    Arc<dyn Fn(&ServiceConfig) -> Result<Arc<dyn TicketSystem>, PluginError> + Send + Sync>;

/// A service type contributed by a plugin
#[derive(Clone)]
pub struct ServiceRegistration {
    pub uses: String,
    pub constructor: ServiceConstructor,
}

impl ServiceRegistration {
    pub fn new<F>(uses: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ServiceConfig) -> Result<Arc<dyn TicketSystem>, PluginError> + Send + Sync + 'static,
    {
        Self {
            uses: uses.into(),
            constructor: Arc::new(constructor),
        }
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("uses", &self.uses)
            .finish()
    }
}

/// Service instances by id
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn TicketSystem>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a service
    pub fn register(&mut self, id: impl Into<String>, service: Arc<dyn TicketSystem>) {
        self.services.insert(id.into(), service);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TicketSystem>> {
        self.services.get(id).cloned()
    }

    /// Resolve a ticket system for a pipe
    pub fn ticket_system(&self, id: &str) -> Result<Arc<dyn TicketSystem>, PipeError> {
        self.get(id)
            .ok_or_else(|| PipeError::ServiceNotFound(id.to_string()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Known service types
#[derive(Clone, Default)]
pub struct ServiceTypes {
    constructors: HashMap<String, ServiceConstructor>,
}

impl ServiceTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service types available without any plugin
    pub fn with_builtins() -> Self {
        let mut types = Self::new();
        types.register(ServiceRegistration::new("in_memory", build_in_memory));
        types
    }

    /// Register a service type, returning `true` if it replaced an earlier one
    pub fn register(&mut self, registration: ServiceRegistration) -> bool {
        self.constructors
            .insert(registration.uses, registration.constructor)
            .is_some()
    }

    pub fn contains(&self, uses: &str) -> bool {
        self.constructors.contains_key(uses)
    }

    /// Instantiate every configured service
    pub fn build(&self, configs: &[ServiceConfig]) -> Result<ServiceRegistry, PluginError> {
        let mut registry = ServiceRegistry::new();
        for config in configs {
            if registry.get(&config.id).is_some() {
                return Err(PluginError::DuplicateRegistration(config.id.clone()));
            }
            let constructor = self
                .constructors
                .get(&config.uses)
                .ok_or_else(|| PluginError::UnknownServiceType(config.uses.clone()))?;

            registry.register(config.id.clone(), constructor(config)?);
            info!(service_id = %config.id, uses = %config.uses, "Service ready");
        }
        Ok(registry)
    }
}

/// `in_memory`: optional `params.tickets` seeds the store
fn build_in_memory(config: &ServiceConfig) -> Result<Arc<dyn TicketSystem>, PluginError> {
    let tickets: Vec<UnifiedTicket> = match config.params.get("tickets") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            PluginError::InvalidService {
                id: config.id.clone(),
                message: format!("invalid tickets: {}", e),
            }
        })?,
    };
    Ok(Arc::new(InMemoryTicketSystem::with_tickets(tickets)))
}
