//! Database repositories.

#![allow(missing_docs)]

mod approval_request;
mod attendance;
mod channel;
mod comment;
mod event;
mod notification;
mod post;
mod push_subscription;
mod reaction;
mod registration;
mod user;

pub use approval_request::{ApprovalFilter, ApprovalRequestRepository};
pub use attendance::AttendanceRepository;
pub use channel::ChannelRepository;
pub use comment::CommentRepository;
pub use event::{EventFilter, EventRepository};
pub use notification::NotificationRepository;
pub use post::PostRepository;
pub use push_subscription::{MAX_FAIL_COUNT, PushSubscriptionRepository};
pub use reaction::ReactionRepository;
pub use registration::RegistrationRepository;
pub use user::{UserFilter, UserRepository};

use sea_orm::{DbErr, SqlErr};
use volunteer_common::AppError;

/// Map a failed insert, reporting a unique index hit as a conflict.
pub(crate) fn insert_error(err: &DbErr, conflict: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(conflict.to_string()),
        _ => AppError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_insert_errors_stay_database_errors() {
        let err = DbErr::RecordNotInserted;

        let mapped = insert_error(&err, "duplicate");

        assert!(matches!(mapped, AppError::Database(_)));
    }
}
