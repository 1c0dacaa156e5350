//! Router Module Index
//!
//! Routes are split by who may reach them. Access control itself lives in the
//! extractors (`Session`, `AdminSession`), so a handler cannot be mounted
//! without its guard.

/// Pages any visitor can load: reading, registration, login, commenting.
pub mod public;

/// Post management, restricted to administrators.
pub mod admin;
