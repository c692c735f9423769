//! Plugins - extra pipe and service types
//!
//! A plugin describes itself with [`PluginMetadata`] and hands over lists
//! of pipe and service registrations. Finding and loading plugins is up to
//! the embedding application; [`PluginHost`] only checks and installs them.

pub mod services;

use crate::core::ServiceConfig;
use crate::pipes::{PipeFactory, PipeRegistration, PipeRegistry};
use crate::template::{TemplateExtensions, TemplateRenderer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use services::{ServiceConstructor, ServiceRegistration, ServiceRegistry, ServiceTypes};

/// Version of the interface plugins are built against
///
/// Plugins are accepted when their `core_api` has the same major version.
pub const CORE_API_VERSION: &str = "1.0";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    #[error("Plugin '{plugin}' requires core API {required}, this build provides {provided}")]
    IncompatibleApi {
        plugin: String,
        required: String,
        provided: String,
    },

    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("Invalid service '{id}': {message}")]
    InvalidService { id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    /// Core API version the plugin was written for
    pub core_api: String,
}

impl PluginMetadata {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        core_api: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            core_api: core_api.into(),
        }
    }
}

/// An installable extension package
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginMetadata;

    fn register_pipes(&self) -> Vec<PipeRegistration> {
        Vec::new()
    }

    fn register_services(&self) -> Vec<ServiceRegistration> {
        Vec::new()
    }
}

/// Owns the pipe and service type tables and the template extensions
pub struct PluginHost {
    pipes: PipeRegistry,
    services: ServiceTypes,
    extensions: Arc<TemplateExtensions>,
    installed: Vec<PluginMetadata>,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost {
    /// Create a host with the built-in pipe and service types
    pub fn new() -> Self {
        Self {
            pipes: PipeRegistry::with_builtins(),
            services: ServiceTypes::with_builtins(),
            extensions: Arc::new(TemplateExtensions::new()),
            installed: Vec::new(),
        }
    }

    /// Register a single pipe type, replacing any earlier one
    pub fn register_pipe(&mut self, registration: PipeRegistration) {
        self.pipes.register(registration);
    }

    /// Register a single service type, replacing any earlier one
    pub fn register_service(&mut self, registration: ServiceRegistration) {
        self.services.register(registration);
    }

    /// Check and install a plugin
    ///
    /// Nothing is registered unless every check passes: the core API must
    /// be compatible, the name unused, and none of the plugin's types may
    /// already exist.
    pub fn install(&mut self, plugin: &dyn Plugin) -> Result<(), PluginError> {
        let metadata = plugin.metadata();
        check_compatible(&metadata)?;

        if self.installed.iter().any(|p| p.name == metadata.name) {
            return Err(PluginError::DuplicateRegistration(metadata.name));
        }

        let pipes = plugin.register_pipes();
        let services = plugin.register_services();
        if let Some(taken) = pipes.iter().find(|r| self.pipes.contains(&r.uses)) {
            return Err(PluginError::DuplicateRegistration(taken.uses.clone()));
        }
        if let Some(taken) = services.iter().find(|r| self.services.contains(&r.uses)) {
            return Err(PluginError::DuplicateRegistration(taken.uses.clone()));
        }

        info!(
            plugin = %metadata.name,
            version = %metadata.version,
            pipes = pipes.len(),
            services = services.len(),
            "Installing plugin"
        );

        for registration in pipes {
            self.pipes.register(registration);
        }
        for registration in services {
            self.services.register(registration);
        }
        self.installed.push(metadata);
        Ok(())
    }

    pub fn installed(&self) -> &[PluginMetadata] {
        &self.installed
    }

    pub fn pipes(&self) -> &PipeRegistry {
        &self.pipes
    }

    pub fn service_types(&self) -> &ServiceTypes {
        &self.services
    }

    /// Template extensions shared by every pipe built from this host
    pub fn extensions(&self) -> &Arc<TemplateExtensions> {
        &self.extensions
    }

    /// Instantiate the configured services and return a factory over them
    pub fn factory(&self, services: &[ServiceConfig]) -> Result<PipeFactory, PluginError> {
        let services = self.services.build(services)?;
        Ok(PipeFactory::new(
            Arc::new(self.pipes.clone()),
            Arc::new(services),
            Arc::new(TemplateRenderer::with_extensions(Arc::clone(&self.extensions))),
        ))
    }
}

fn major_version(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

/// Accept a plugin whose core API major version matches this build
pub fn check_compatible(metadata: &PluginMetadata) -> Result<(), PluginError> {
    match (major_version(&metadata.core_api), major_version(CORE_API_VERSION)) {
        (Some(required), Some(provided)) if required == provided => Ok(()),
        _ => Err(PluginError::IncompatibleApi {
            plugin: metadata.name.clone(),
            required: metadata.core_api.clone(),
            provided: CORE_API_VERSION.to_string(),
        }),
    }
}
