// Configuration loading
pub mod config;

// SQLite entity store
pub mod store;

// User directory (email login)
pub mod user;

// Event registry and join codes
pub mod event;

// HTTP API
pub mod api;
