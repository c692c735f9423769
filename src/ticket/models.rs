//! Backend-neutral ticket models

use serde::{Deserialize, Serialize};

/// A named reference to a backend object (queue, priority, user)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UnifiedEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// Whether this entity refers to the same object as `other`
    ///
    /// Ids are compared when both sides have one, names otherwise.
    pub fn matches(&self, other: &UnifiedEntity) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name.is_some() && self.name == other.name,
        }
    }
}

/// A note or article attached to a ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default)]
    pub body: String,
}

impl UnifiedNote {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A ticket as seen by pipes
///
/// Every field is optional so the same type doubles as an update patch:
/// only the fields that are present are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedTicket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<UnifiedEntity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<UnifiedEntity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<UnifiedNote>,
}

impl UnifiedTicket {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_queue(mut self, queue: UnifiedEntity) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_priority(mut self, priority: UnifiedEntity) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Apply the fields present in `patch`
    ///
    /// Notes in the patch are appended. The id is never changed.
    pub fn apply(&mut self, patch: &UnifiedTicket) {
        if let Some(subject) = &patch.subject {
            self.subject = Some(subject.clone());
        }
        if let Some(body) = &patch.body {
            self.body = Some(body.clone());
        }
        if let Some(queue) = &patch.queue {
            self.queue = Some(queue.clone());
        }
        if let Some(priority) = &patch.priority {
            self.priority = Some(priority.clone());
        }
        self.notes.extend(patch.notes.iter().cloned());
    }
}

fn default_limit() -> usize {
    10
}

/// Filter for ticket searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<UnifiedEntity>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

impl Default for TicketSearchCriteria {
    fn default() -> Self {
        Self {
            queue: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl TicketSearchCriteria {
    pub fn in_queue(queue: UnifiedEntity) -> Self {
        Self {
            queue: Some(queue),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether a ticket passes the queue filter
    pub fn accepts(&self, ticket: &UnifiedTicket) -> bool {
        match (&self.queue, &ticket.queue) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.matches(actual),
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_patch_keeps_missing_fields() {
        let mut ticket = UnifiedTicket::new("Printer broken")
            .with_id("1")
            .with_body("It jams")
            .with_queue(UnifiedEntity::named("Inbox"));

        let patch = UnifiedTicket {
            queue: Some(UnifiedEntity::named("Hardware")),
            notes: vec![UnifiedNote::new("moved")],
            ..UnifiedTicket::default()
        };
        ticket.apply(&patch);

        assert_eq!(ticket.id.as_deref(), Some("1"));
        assert_eq!(ticket.subject.as_deref(), Some("Printer broken"));
        assert_eq!(ticket.queue, Some(UnifiedEntity::named("Hardware")));
        assert_eq!(ticket.notes.len(), 1);
    }

    #[test]
    fn test_criteria_defaults_from_json() {
        let criteria: TicketSearchCriteria =
            serde_json::from_value(json!({"queue": {"name": "Inbox"}})).unwrap();
        assert_eq!(criteria.limit, 10);
        assert_eq!(criteria.offset, 0);
        assert_eq!(criteria.queue, Some(UnifiedEntity::named("Inbox")));
    }

    #[test]
    fn test_entity_matching() {
        let by_id = UnifiedEntity {
            id: Some("3".into()),
            name: Some("Inbox".into()),
        };
        let other_id = UnifiedEntity {
            id: Some("4".into()),
            name: Some("Inbox".into()),
        };
        assert!(!by_id.matches(&other_id));
        assert!(by_id.matches(&UnifiedEntity::named("Inbox")));
        assert!(!UnifiedEntity::default().matches(&UnifiedEntity::default()));
    }

    #[test]
    fn test_criteria_accepts() {
        let criteria = TicketSearchCriteria::in_queue(UnifiedEntity::named("Inbox"));
        assert!(criteria.accepts(&UnifiedTicket::new("a").with_queue(UnifiedEntity::named("Inbox"))));
        assert!(!criteria.accepts(&UnifiedTicket::new("b")));
        assert!(TicketSearchCriteria::default().accepts(&UnifiedTicket::new("c")));
    }
}
