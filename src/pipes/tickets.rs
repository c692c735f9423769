//! Pipes that talk to a ticket system

use crate::core::{PipeContext, PipeResult, RenderedPipeConfig};
use crate::pipes::{required_str, typed_param, PipeError, PipeHandler};
use crate::plugin::ServiceRegistry;
use crate::ticket::{TicketSearchCriteria, UnifiedNote, UnifiedTicket};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Searches a ticket system and records the matches as `fetched_tickets`
///
/// Params: `ticket_system` (service id), `criteria` (optional search filter).
#[derive(Debug)]
pub struct FetchTicketsHandler {
    services: Arc<ServiceRegistry>,
}

impl FetchTicketsHandler {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipeHandler for FetchTicketsHandler {
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        _context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let system = self
            .services
            .ticket_system(&required_str(rendered, "ticket_system")?)?;
        let criteria: TicketSearchCriteria = match rendered.params.get("criteria") {
            Some(_) => typed_param(rendered, "criteria")?,
            None => TicketSearchCriteria::default(),
        };

        let tickets = system.find_tickets(&criteria).await?;
        info!(pipe_id = %rendered.id, count = tickets.len(), "Fetched tickets");

        let fetched = serde_json::to_value(&tickets)
            .map_err(|e| PipeError::Execution(format!("Failed to encode tickets: {}", e)))?;
        Ok(PipeResult::success()
            .with_message(format!("Fetched {} tickets", tickets.len()))
            .with_value("fetched_tickets", fetched))
    }
}

/// Applies `updated_ticket` to the ticket `ticket_id`
#[derive(Debug)]
pub struct UpdateTicketHandler {
    services: Arc<ServiceRegistry>,
}

impl UpdateTicketHandler {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipeHandler for UpdateTicketHandler {
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        _context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let system = self
            .services
            .ticket_system(&required_str(rendered, "ticket_system")?)?;
        let ticket_id = required_str(rendered, "ticket_id")?;
        let patch: UnifiedTicket = typed_param(rendered, "updated_ticket")?;

        if !system.update_ticket(&ticket_id, &patch).await? {
            return Err(PipeError::Execution(format!(
                "Failed to update ticket {}",
                ticket_id
            )));
        }

        info!(pipe_id = %rendered.id, ticket_id = %ticket_id, "Updated ticket");
        Ok(PipeResult::success().with_value("ticket_id", Value::String(ticket_id)))
    }
}

/// Adds `note` to the ticket `ticket_id`
///
/// `note` is either a note object or a plain string used as the body.
#[derive(Debug)]
pub struct AddNoteHandler {
    services: Arc<ServiceRegistry>,
}

impl AddNoteHandler {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipeHandler for AddNoteHandler {
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        _context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let system = self
            .services
            .ticket_system(&required_str(rendered, "ticket_system")?)?;
        let ticket_id = required_str(rendered, "ticket_id")?;
        let note = match rendered.params.get("note") {
            Some(Value::String(body)) => UnifiedNote::new(body.clone()),
            _ => typed_param::<UnifiedNote>(rendered, "note")?,
        };

        if !system.add_note(&ticket_id, &note).await? {
            return Err(PipeError::Execution(format!(
                "Failed to add note to ticket {}",
                ticket_id
            )));
        }

        info!(pipe_id = %rendered.id, ticket_id = %ticket_id, "Added note");
        Ok(PipeResult::success().with_value("ticket_id", Value::String(ticket_id)))
    }
}
