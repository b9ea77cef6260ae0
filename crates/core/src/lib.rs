//! Core business logic for Volunteer Hub.
//!
//! Services own the workflow rules (who may do what, in which state) and
//! keep multi-table writes inside one database transaction. Notification
//! side effects run after commit and never fail the calling operation.

pub mod services;

pub use services::*;
