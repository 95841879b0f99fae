use crate::store::Store;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;


/// Store-assigned user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered user. Hosts and attendees are both plain users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    /// Unique, compared case-sensitively
    pub email: String,
    /// Optional display name (never set by the API today)
    pub name: Option<String>,
}

/// Email-only "login": finds the user for an address or creates one.
pub struct UserDirectory {
    store: Arc<Store>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Look up a user by exact email, creating it on first sight.
    ///
    /// Calling this twice with the same email returns the same identity.
    /// If another caller inserts the same email concurrently, the unique
    /// constraint rejects our insert and we return the winner's row.
    pub fn login_or_register(&self, email: &str) -> Result<User> {
        if let Some(user) = self.store.find_user_by_email(email)? {
            return Ok(user);
        }

        match self.store.insert_user(email)? {
            Some(user) => {
                info!(user_id = %user.id, email = %user.email, "User registered");
                Ok(user)
            }
            None => self
                .store
                .find_user_by_email(email)?
                .ok_or_else(|| anyhow!("user {} vanished after email conflict", email)),
        }
    }

    /// Find a user by id. Absence is not an error.
    pub fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.store.find_user(id)
    }
}
