use super::{AppState, ErrorResponse};
use crate::event::{Attendee, Event, EventId, NewEvent, RegistryError};
use crate::user::{User, UserId};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Numeric id sent either as a JSON number or as a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdInput {
    Number(i64),
    Text(String),
}

impl IdInput {
    fn parse(self, field: &str) -> Result<i64, EventApiError> {
        match self {
            IdInput::Number(n) => Ok(n),
            IdInput::Text(s) => parse_id(&s, field),
        }
    }
}

/// Request to create an event
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub user_id: Option<IdInput>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// ISO local date-time, e.g. "2025-06-01T18:30"
    pub event_date_time: Option<String>,
    pub is_online: Option<bool>,
    pub location: Option<String>,
}

/// Request to register for an event by code
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_id: Option<IdInput>,
    pub event_code: Option<String>,
}

/// Optional acting user for host-only operations
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostQuery {
    pub user_id: Option<String>,
}

/// Response for event deletion
#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Create event API router
pub fn create_event_router(state: AppState) -> Router {
    Router::new()
        .route("/api/events/create", post(create_event))
        .route("/api/events/register", post(register_for_event))
        .route("/api/events/hosted/:user_id", get(hosted_events))
        .route("/api/events/attending/:user_id", get(attending_events))
        .route("/api/events/:event_id", delete(delete_event))
        .route("/api/events/:event_id/attendees", get(event_attendees))
        .with_state(Arc::new(state))
}

/// POST /api/events/create - Create an event hosted by `userId`
///
/// The host is resolved before `eventDateTime` and `location` are checked.
async fn create_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Event>, EventApiError> {
    let request: CreateEventRequest = serde_json::from_slice(&body)
        .map_err(|e| EventApiError::Validation(format!("Invalid request body: {}", e)))?;
    let fields = require_create_fields(request)?;

    let host = resolve_user(&state, fields.user_id)?;

    let new_event = fields.into_new_event()?;

    info!(host_id = %host.id, title = %new_event.title, "Creating event");

    let event = state
        .events
        .create_event(new_event, &host)
        .map_err(|e| internal(e, "Failed to create event"))?;

    Ok(Json(event))
}

/// POST /api/events/register - Register `userId` for the event behind `eventCode`
async fn register_for_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Event>, EventApiError> {
    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|e| EventApiError::Validation(format!("Invalid request body: {}", e)))?;

    let user_id = request
        .user_id
        .ok_or_else(|| EventApiError::Validation("userId is required".to_string()))?
        .parse("userId")?;
    let event_code = request
        .event_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| EventApiError::Validation("eventCode is required".to_string()))?;

    let user = resolve_user(&state, UserId(user_id))?;

    let event = state
        .events
        .register_for_event(&event_code, &user)
        .map_err(|e| match e {
            rejected @ (RegistryError::InvalidCode
            | RegistryError::OwnEvent
            | RegistryError::AlreadyRegistered) => EventApiError::Rejected(rejected),
            other => internal(other, "Failed to register for event"),
        })?;

    Ok(Json(event))
}

/// GET /api/events/hosted/:user_id - Events hosted by a user
async fn hosted_events(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Event>>, EventApiError> {
    let user = resolve_user(&state, UserId(parse_id(&user_id, "userId")?))?;

    let events = state
        .events
        .hosted_events(&user)
        .map_err(|e| internal(e, "Failed to retrieve hosted events"))?;

    Ok(Json(events))
}

/// GET /api/events/attending/:user_id - Events a user registered for
async fn attending_events(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Event>>, EventApiError> {
    let user = resolve_user(&state, UserId(parse_id(&user_id, "userId")?))?;

    let events = state
        .events
        .attending_events(&user)
        .map_err(|e| internal(e, "Failed to retrieve attending events"))?;

    Ok(Json(events))
}

/// DELETE /api/events/:event_id - Delete an event and its registrations
async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Query(query): Query<HostQuery>,
) -> Result<Json<DeleteResponse>, EventApiError> {
    let event_id = EventId(parse_id(&event_id, "eventId")?);
    authorize_host(&state, event_id, query.user_id.as_deref())?;

    state.events.delete_event(event_id).map_err(|e| match e {
        RegistryError::EventNotFound => EventApiError::EventNotFound,
        other => internal(other, "Failed to delete event"),
    })?;

    Ok(Json(DeleteResponse {
        message: "Event deleted successfully".to_string(),
    }))
}

/// GET /api/events/:event_id/attendees - Who registered for an event
async fn event_attendees(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Query(query): Query<HostQuery>,
) -> Result<Json<Vec<Attendee>>, EventApiError> {
    let event_id = EventId(parse_id(&event_id, "eventId")?);
    authorize_host(&state, event_id, query.user_id.as_deref())?;

    let attendees = state.events.event_attendees(event_id).map_err(|e| match e {
        RegistryError::EventNotFound => EventApiError::EventNotFound,
        other => internal(other, "Failed to retrieve attendees"),
    })?;

    Ok(Json(attendees))
}

/// Create-event fields that must be present before the host is looked up
struct CreateFields {
    user_id: UserId,
    title: String,
    description: String,
    event_date_time: Option<String>,
    is_online: Option<bool>,
    location: Option<String>,
}

fn require_create_fields(request: CreateEventRequest) -> Result<CreateFields, EventApiError> {
    let user_id = request
        .user_id
        .ok_or_else(|| EventApiError::Validation("userId is required".to_string()))?
        .parse("userId")?;
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| EventApiError::Validation("title is required".to_string()))?;
    let description = request
        .description
        .ok_or_else(|| EventApiError::Validation("description is required".to_string()))?;

    Ok(CreateFields {
        user_id: UserId(user_id),
        title,
        description,
        event_date_time: request.event_date_time,
        is_online: request.is_online,
        location: request.location,
    })
}

impl CreateFields {
    /// Check the shape of the optional fields
    ///
    /// `isOnline` defaults to "no location given". In-person events need a
    /// non-blank location.
    fn into_new_event(self) -> Result<NewEvent, EventApiError> {
        let event_date_time = self
            .event_date_time
            .as_deref()
            .map(parse_event_date_time)
            .transpose()?;

        let location = self.location.filter(|l| !l.trim().is_empty());
        let is_online = self.is_online.unwrap_or(location.is_none());
        if !is_online && location.is_none() {
            return Err(EventApiError::Validation(
                "Location is required for in-person events".to_string(),
            ));
        }

        Ok(NewEvent {
            title: self.title,
            description: self.description,
            event_date_time,
            location,
            is_online,
        })
    }
}

/// Parse a numeric id from a path segment, query value or string field
fn parse_id(value: &str, field: &str) -> Result<i64, EventApiError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| EventApiError::Validation(format!("Invalid {}: {}", field, value)))
}

/// Parse an ISO local date-time; seconds and fractions are optional
fn parse_event_date_time(value: &str) -> Result<NaiveDateTime, EventApiError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| {
            EventApiError::Validation(format!("Invalid eventDateTime: {}", value))
        })
}

/// Resolve the acting user, short-circuiting before the registry is touched
fn resolve_user(state: &AppState, user_id: UserId) -> Result<User, EventApiError> {
    state
        .users
        .find_by_id(user_id)
        .map_err(|e| internal(e.into(), "Failed to look up user"))?
        .ok_or(EventApiError::UserNotFound)
}

/// Host-only guard, active when `enforce_host_identity` is set
fn authorize_host(
    state: &AppState,
    event_id: EventId,
    user_id: Option<&str>,
) -> Result<(), EventApiError> {
    if !state.enforce_host_identity {
        return Ok(());
    }

    let user_id = user_id
        .ok_or_else(|| EventApiError::Validation("userId is required".to_string()))
        .and_then(|id| parse_id(id, "userId"))?;
    let event = state
        .events
        .find_event(event_id)
        .map_err(|e| internal(e, "Failed to look up event"))?
        .ok_or(EventApiError::EventNotFound)?;

    if event.host_id != UserId(user_id) {
        return Err(EventApiError::Forbidden);
    }

    Ok(())
}

/// Log the underlying failure and hide it behind a generic message
fn internal(err: RegistryError, message: &'static str) -> EventApiError {
    error!(error = %err, "{}", message);
    EventApiError::Internal(message)
}

/// Event API error types
#[derive(Debug)]
enum EventApiError {
    Validation(String),
    UserNotFound,
    /// Registry rule violation, relayed verbatim
    Rejected(RegistryError),
    EventNotFound,
    Forbidden,
    Internal(&'static str),
}

impl IntoResponse for EventApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            EventApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            EventApiError::UserNotFound => (StatusCode::BAD_REQUEST, "User not found".to_string()),
            EventApiError::Rejected(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            EventApiError::EventNotFound => (
                StatusCode::NOT_FOUND,
                RegistryError::EventNotFound.to_string(),
            ),
            EventApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Only the host can manage this event".to_string(),
            ),
            EventApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
