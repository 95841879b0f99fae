//! Entity persistence using SQLite.
//!
//! Holds users, events and registrations. Uniqueness of emails, event codes
//! and (user, event) pairs is enforced by the schema, so it also holds when
//! two callers race past the services' own pre-checks. Insert methods report
//! such a conflict as `Ok(None)` instead of an error.

use crate::event::{Attendee, Event, EventId, NewEvent, Registration};
use crate::user::{User, UserId};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Columns selected for every event query, in `event_from_row` order.
const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.event_code, e.host_id, \
     e.event_date_time, e.location, e.is_online, e.created_at";

/// SQLite-backed entity store.
///
/// # Schema
/// ```sql
/// CREATE TABLE users (
///     id    INTEGER PRIMARY KEY AUTOINCREMENT,
///     email TEXT NOT NULL UNIQUE,
///     name  TEXT
/// );
/// CREATE TABLE events (
///     id              INTEGER PRIMARY KEY AUTOINCREMENT,
///     title           TEXT NOT NULL,
///     description     TEXT NOT NULL,
///     event_code      TEXT NOT NULL UNIQUE,
///     host_id         INTEGER NOT NULL REFERENCES users(id),
///     event_date_time TEXT,
///     location        TEXT,
///     is_online       INTEGER NOT NULL,
///     created_at      TEXT NOT NULL
/// );
/// CREATE TABLE registrations (
///     id            INTEGER PRIMARY KEY AUTOINCREMENT,
///     user_id       INTEGER NOT NULL REFERENCES users(id),
///     event_id      INTEGER NOT NULL REFERENCES events(id),
///     registered_at TEXT NOT NULL,
///     UNIQUE(user_id, event_id)
/// );
/// ```
///
/// # Thread Safety
/// The connection sits behind a `Mutex`, so every call is serialized and a
/// multi-statement call (such as the cascading delete) is never interleaved
/// with another caller's writes.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database and ensures the schema exists.
    ///
    /// `":memory:"` gives a private in-memory database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open entity store at {}", db_path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id    INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name  TEXT
            );

            CREATE TABLE IF NOT EXISTS events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                event_code      TEXT NOT NULL UNIQUE,
                host_id         INTEGER NOT NULL REFERENCES users(id),
                event_date_time TEXT,
                location        TEXT,
                is_online       INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_host ON events(host_id);

            CREATE TABLE IF NOT EXISTS registrations (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL REFERENCES users(id),
                event_id      INTEGER NOT NULL REFERENCES events(id),
                registered_at TEXT NOT NULL,
                UNIQUE(user_id, event_id)
            );
            CREATE INDEX IF NOT EXISTS idx_registrations_event ON registrations(event_id);",
        )
        .context("Failed to create entity tables")?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Entity store connection mutex poisoned"))
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, name FROM users WHERE id = ?1",
            params![id.0],
            user_from_row,
        )
        .optional()
        .context("Failed to look up user by id")
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, name FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
        .optional()
        .context("Failed to look up user by email")
    }

    /// Inserts a user with no name. Returns `Ok(None)` if the email is taken.
    pub fn insert_user(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        match conn.execute("INSERT INTO users (email) VALUES (?1)", params![email]) {
            Ok(_) => Ok(Some(User {
                id: UserId(conn.last_insert_rowid()),
                email: email.to_string(),
                name: None,
            })),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e).context("Failed to insert user"),
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn event_code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE event_code = ?1)",
            params![code],
            |row| row.get(0),
        )
        .context("Failed to check event code")
    }

    /// Inserts an event under `code`. Returns `Ok(None)` if the code is taken.
    pub fn insert_event(&self, new: &NewEvent, code: &str, host: UserId) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO events (
                title, description, event_code, host_id,
                event_date_time, location, is_online, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.title,
                new.description,
                code,
                host.0,
                new.event_date_time,
                new.location,
                new.is_online,
                created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(Some(Event {
                id: EventId(conn.last_insert_rowid()),
                title: new.title.clone(),
                description: new.description.clone(),
                event_code: code.to_string(),
                host_id: host,
                event_date_time: new.event_date_time,
                location: new.location.clone(),
                is_online: new.is_online,
                created_at,
            })),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e).context("Failed to insert event"),
        }
    }

    pub fn find_event(&self, id: EventId) -> Result<Option<Event>> {
        let conn = self.conn()?;
        find_event_with(&conn, id)
    }

    pub fn find_event_by_code(&self, code: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM events e WHERE e.event_code = ?1", EVENT_COLUMNS),
            params![code],
            event_from_row,
        )
        .optional()
        .context("Failed to look up event by code")
    }

    /// Events hosted by `host`, oldest first.
    pub fn events_by_host(&self, host: UserId) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM events e WHERE e.host_id = ?1 ORDER BY e.id",
                EVENT_COLUMNS
            ))
            .context("Failed to prepare hosted events query")?;

        let events = stmt
            .query_map(params![host.0], event_from_row)
            .context("Failed to query hosted events")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read hosted events")?;

        Ok(events)
    }

    /// Events `user` holds a registration for, in registration order.
    pub fn events_attended_by(&self, user: UserId) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM registrations r
                 JOIN events e ON e.id = r.event_id
                 WHERE r.user_id = ?1
                 ORDER BY r.id",
                EVENT_COLUMNS
            ))
            .context("Failed to prepare attending events query")?;

        let events = stmt
            .query_map(params![user.0], event_from_row)
            .context("Failed to query attending events")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read attending events")?;

        Ok(events)
    }

    /// Deletes an event together with all of its registrations.
    ///
    /// Both deletes run in one transaction. Returns the number of
    /// registrations removed, or `Ok(None)` if the event does not exist.
    pub fn delete_event(&self, id: EventId) -> Result<Option<usize>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .context("Failed to begin delete transaction")?;

        if find_event_with(&tx, id)?.is_none() {
            return Ok(None);
        }

        let registrations = tx
            .execute(
                "DELETE FROM registrations WHERE event_id = ?1",
                params![id.0],
            )
            .context("Failed to delete registrations")?;
        tx.execute("DELETE FROM events WHERE id = ?1", params![id.0])
            .context("Failed to delete event")?;

        tx.commit().context("Failed to commit event deletion")?;
        Ok(Some(registrations))
    }

    // ── Registrations ────────────────────────────────────────────────────────

    pub fn registration_exists(&self, user: UserId, event: EventId) -> Result<bool> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM registrations WHERE user_id = ?1 AND event_id = ?2)",
            params![user.0, event.0],
            |row| row.get(0),
        )
        .context("Failed to check registration")
    }

    /// Inserts a registration. Returns `Ok(None)` if the pair already exists.
    pub fn insert_registration(&self, user: UserId, event: EventId) -> Result<Option<Registration>> {
        let conn = self.conn()?;
        let registered_at = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO registrations (user_id, event_id, registered_at) VALUES (?1, ?2, ?3)",
            params![user.0, event.0, registered_at],
        );

        match inserted {
            Ok(_) => Ok(Some(Registration {
                id: conn.last_insert_rowid(),
                user_id: user,
                event_id: event,
                registered_at,
            })),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e).context("Failed to insert registration"),
        }
    }

    /// Attendees of an event in registration order, or `Ok(None)` if the
    /// event does not exist.
    pub fn attendees(&self, event: EventId) -> Result<Option<Vec<Attendee>>> {
        let conn = self.conn()?;
        if find_event_with(&conn, event)?.is_none() {
            return Ok(None);
        }

        let mut stmt = conn
            .prepare(
                "SELECT u.name, u.email, r.registered_at
                 FROM registrations r
                 JOIN users u ON u.id = r.user_id
                 WHERE r.event_id = ?1
                 ORDER BY r.id",
            )
            .context("Failed to prepare attendees query")?;

        let attendees = stmt
            .query_map(params![event.0], |row| {
                Ok(Attendee {
                    name: row.get(0)?,
                    email: row.get(1)?,
                    registered_at: row.get(2)?,
                })
            })
            .context("Failed to query attendees")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read attendees")?;

        Ok(Some(attendees))
    }
}

fn find_event_with(conn: &Connection, id: EventId) -> Result<Option<Event>> {
    conn.query_row(
        &format!("SELECT {} FROM events e WHERE e.id = ?1", EVENT_COLUMNS),
        params![id.0],
        event_from_row,
    )
    .optional()
    .context("Failed to look up event by id")
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: EventId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        event_code: row.get(3)?,
        host_id: UserId(row.get(4)?),
        event_date_time: row.get(5)?,
        location: row.get(6)?,
        is_online: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
