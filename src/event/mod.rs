use crate::store::Store;
use crate::user::{User, UserId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub mod code;

#[cfg(test)]
mod tests;

pub use code::CodeGenerator;

/// Store-assigned event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event created by a host and joinable through its code
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    /// Unique join code (EVT-XXXX)
    pub event_code: String,
    pub host_id: UserId,
    /// When the event takes place (local wall-clock time, no zone)
    pub event_date_time: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub is_online: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the host when creating an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub event_date_time: Option<NaiveDateTime>,
    /// Must be non-empty when `is_online` is false (checked by the caller)
    pub location: Option<String>,
    pub is_online: bool,
}

/// One user's enrollment in one event
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: i64,
    pub user_id: UserId,
    pub event_id: EventId,
    pub registered_at: DateTime<Utc>,
}

/// Attendee as shown to the host (no internal ids)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

/// Event registry errors
#[derive(Debug)]
pub enum RegistryError {
    /// No event carries the given code
    InvalidCode,
    /// The host tried to register for their own event
    OwnEvent,
    /// The user already holds a registration for the event
    AlreadyRegistered,
    EventNotFound,
    /// No free code found within the retry ceiling
    CodeSpaceExhausted { attempts: u32 },
    Store(anyhow::Error),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidCode => write!(f, "Invalid event code"),
            RegistryError::OwnEvent => write!(f, "You cannot register for your own event"),
            RegistryError::AlreadyRegistered => {
                write!(f, "You are already registered for this event")
            }
            RegistryError::EventNotFound => write!(f, "Event not found"),
            RegistryError::CodeSpaceExhausted { attempts } => write!(
                f,
                "Could not generate a unique event code after {} attempts",
                attempts
            ),
            RegistryError::Store(e) => write!(f, "Storage error: {:#}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<anyhow::Error> for RegistryError {
    fn from(e: anyhow::Error) -> Self {
        RegistryError::Store(e)
    }
}

/// Business rules for events and registrations
pub struct EventRegistry {
    store: Arc<Store>,
    codes: CodeGenerator,
}

impl EventRegistry {
    pub fn new(store: Arc<Store>, codes: CodeGenerator) -> Self {
        Self { store, codes }
    }

    /// Create an event hosted by `host` under a freshly generated code.
    ///
    /// A candidate is rejected when the store already holds it, or when the
    /// insert loses a race for the same code to another creator.
    pub fn create_event(&self, new: NewEvent, host: &User) -> Result<Event, RegistryError> {
        let event = self.codes.generate(|candidate| {
            if self.code_taken(candidate)? {
                return Ok(None);
            }
            self.claim_code(&new, candidate, host.id)
        })?;

        info!(
            event_id = %event.id,
            event_code = %event.event_code,
            host_id = %host.id,
            "Event created"
        );

        Ok(event)
    }

    fn code_taken(&self, candidate: &str) -> anyhow::Result<bool> {
        self.store.event_code_exists(candidate)
    }

    /// Insert under `candidate`; `None` when another event already holds it
    fn claim_code(
        &self,
        new: &NewEvent,
        candidate: &str,
        host: UserId,
    ) -> anyhow::Result<Option<Event>> {
        self.store.insert_event(new, candidate, host)
    }

    /// Register `user` for the event behind `event_code`.
    ///
    /// Checks run in a fixed order: unknown code, own event, duplicate.
    pub fn register_for_event(&self, event_code: &str, user: &User) -> Result<Event, RegistryError> {
        if !code::is_well_formed(event_code) {
            return Err(RegistryError::InvalidCode);
        }

        let event = self
            .store
            .find_event_by_code(event_code)?
            .ok_or(RegistryError::InvalidCode)?;

        if event.host_id == user.id {
            return Err(RegistryError::OwnEvent);
        }

        if self.store.registration_exists(user.id, event.id)? {
            return Err(RegistryError::AlreadyRegistered);
        }

        // The unique constraint settles concurrent duplicates
        let registration = self
            .store
            .insert_registration(user.id, event.id)?
            .ok_or(RegistryError::AlreadyRegistered)?;

        info!(
            registration_id = registration.id,
            event_id = %event.id,
            user_id = %user.id,
            "User registered for event"
        );

        Ok(event)
    }

    pub fn hosted_events(&self, host: &User) -> Result<Vec<Event>, RegistryError> {
        Ok(self.store.events_by_host(host.id)?)
    }

    pub fn attending_events(&self, user: &User) -> Result<Vec<Event>, RegistryError> {
        Ok(self.store.events_attended_by(user.id)?)
    }

    pub fn find_event(&self, event_id: EventId) -> Result<Option<Event>, RegistryError> {
        Ok(self.store.find_event(event_id)?)
    }

    /// Delete an event and, in the same transaction, all its registrations.
    pub fn delete_event(&self, event_id: EventId) -> Result<(), RegistryError> {
        match self.store.delete_event(event_id)? {
            Some(registrations) => {
                info!(event_id = %event_id, registrations, "Event deleted");
                Ok(())
            }
            None => {
                warn!(event_id = %event_id, "Delete requested for unknown event");
                Err(RegistryError::EventNotFound)
            }
        }
    }

    pub fn event_attendees(&self, event_id: EventId) -> Result<Vec<Attendee>, RegistryError> {
        self.store
            .attendees(event_id)?
            .ok_or(RegistryError::EventNotFound)
    }
}
