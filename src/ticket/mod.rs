//! Ticket system adapters

pub mod memory;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryTicketSystem;
pub use models::{TicketSearchCriteria, UnifiedEntity, UnifiedNote, UnifiedTicket};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TicketSystemError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket backend error: {0}")]
    Backend(String),
}

/// Trait for ticket backends - pipes only talk to this interface
#[async_trait]
pub trait TicketSystem: Send + Sync {
    /// Find tickets matching the criteria
    async fn find_tickets(
        &self,
        criteria: &TicketSearchCriteria,
    ) -> Result<Vec<UnifiedTicket>, TicketSystemError>;

    /// Find the first ticket matching the criteria
    async fn find_first_ticket(
        &self,
        criteria: &TicketSearchCriteria,
    ) -> Result<Option<UnifiedTicket>, TicketSystemError> {
        let criteria = TicketSearchCriteria {
            limit: 1,
            ..criteria.clone()
        };
        Ok(self.find_tickets(&criteria).await?.into_iter().next())
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<UnifiedTicket>, TicketSystemError>;

    /// Create a ticket and return its id
    async fn create_ticket(&self, ticket: &UnifiedTicket) -> Result<String, TicketSystemError>;

    /// Apply the fields present in `patch`; `false` when the ticket does not exist
    async fn update_ticket(
        &self,
        id: &str,
        patch: &UnifiedTicket,
    ) -> Result<bool, TicketSystemError>;

    async fn add_note(&self, id: &str, note: &UnifiedNote) -> Result<bool, TicketSystemError>;
}
