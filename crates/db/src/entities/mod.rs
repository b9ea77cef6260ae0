//! Database entities.

#![allow(missing_docs)]

pub mod approval_request;
pub mod attendance;
pub mod channel;
pub mod comment;
pub mod event;
pub mod notification;
pub mod post;
pub mod push_subscription;
pub mod reaction;
pub mod registration;
pub mod user;

pub use approval_request::Entity as ApprovalRequest;
pub use attendance::Entity as Attendance;
pub use channel::Entity as Channel;
pub use comment::Entity as Comment;
pub use event::Entity as Event;
pub use notification::Entity as Notification;
pub use post::Entity as Post;
pub use push_subscription::Entity as PushSubscription;
pub use reaction::Entity as Reaction;
pub use registration::Entity as Registration;
pub use user::Entity as User;

use sea_orm::prelude::Json;

/// Read a JSON array column as a list of strings, skipping non-string items.
#[must_use]
pub fn json_strings(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}
