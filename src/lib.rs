//! ticketpipe - scheduled pipes for ticket automation

pub mod cli;
pub mod core;
pub mod execution;
pub mod pipes;
pub mod plugin;
pub mod template;
pub mod ticket;

// Re-export commonly used types
pub use crate::core::{OrchestratorConfig, PipeConfig, PipeContext, PipeResult, PipeStatus, RunnerConfig};
pub use execution::{Orchestrator, OrchestratorError, OrchestratorEvent, RunnerError};
pub use pipes::{Pipe, PipeError, PipeFactory, PipeHandler, PipeRegistration, PipeRegistry};
pub use plugin::{Plugin, PluginError, PluginHost, PluginMetadata, ServiceRegistry};
pub use template::{RenderPolicy, TemplateError, TemplateExtensions, TemplateRenderer};
pub use ticket::{InMemoryTicketSystem, TicketSystem, TicketSystemError};
