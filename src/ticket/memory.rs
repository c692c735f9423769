//! In-memory ticket backend

use crate::ticket::{
    TicketSearchCriteria, TicketSystem, TicketSystemError, UnifiedNote, UnifiedTicket,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Ticket store kept in process memory
///
/// Tickets are ordered by id, and new ids are allocated from a counter.
#[derive(Debug, Default)]
pub struct InMemoryTicketSystem {
    tickets: RwLock<BTreeMap<String, UnifiedTicket>>,
    next_id: AtomicU64,
}

impl InMemoryTicketSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with tickets
    ///
    /// Tickets without an id get one allocated.
    pub fn with_tickets(tickets: impl IntoIterator<Item = UnifiedTicket>) -> Self {
        let system = Self::new();
        let mut map = BTreeMap::new();
        for mut ticket in tickets {
            let id = ticket.id.clone().unwrap_or_else(|| system.allocate_id());
            ticket.id = Some(id.clone());
            map.insert(id, ticket);
        }
        Self {
            tickets: RwLock::new(map),
            next_id: system.next_id,
        }
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Snapshot of every stored ticket
    pub async fn tickets(&self) -> Vec<UnifiedTicket> {
        self.tickets.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }
}

#[async_trait]
impl TicketSystem for InMemoryTicketSystem {
    async fn find_tickets(
        &self,
        criteria: &TicketSearchCriteria,
    ) -> Result<Vec<UnifiedTicket>, TicketSystemError> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .values()
            .filter(|ticket| criteria.accepts(ticket))
            .skip(criteria.offset)
            .take(criteria.limit)
            .cloned()
            .collect())
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<UnifiedTicket>, TicketSystemError> {
        Ok(self.tickets.read().await.get(id).cloned())
    }

    async fn create_ticket(&self, ticket: &UnifiedTicket) -> Result<String, TicketSystemError> {
        let mut tickets = self.tickets.write().await;
        let mut id = self.allocate_id();
        while tickets.contains_key(&id) {
            id = self.allocate_id();
        }

        let mut ticket = ticket.clone();
        ticket.id = Some(id.clone());
        tickets.insert(id.clone(), ticket);

        debug!(ticket_id = %id, "Created ticket");
        Ok(id)
    }

    async fn update_ticket(
        &self,
        id: &str,
        patch: &UnifiedTicket,
    ) -> Result<bool, TicketSystemError> {
        let mut tickets = self.tickets.write().await;
        match tickets.get_mut(id) {
            Some(ticket) => {
                ticket.apply(patch);
                debug!(ticket_id = %id, "Updated ticket");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_note(&self, id: &str, note: &UnifiedNote) -> Result<bool, TicketSystemError> {
        let mut tickets = self.tickets.write().await;
        match tickets.get_mut(id) {
            Some(ticket) => {
                let mut note = note.clone();
                if note.id.is_none() {
                    note.id = Some(format!("{}-{}", id, ticket.notes.len() + 1));
                }
                ticket.notes.push(note);
                debug!(ticket_id = %id, "Added note");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
