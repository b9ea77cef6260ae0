//! Model builders shared by the service tests.

use chrono::{Duration, Utc};
use serde_json::json;
use volunteer_db::entities::{
    channel,
    event::{self, EventStatus},
    registration::{self, RegistrationStatus},
    user::{self, Role, UserStatus},
};

pub fn user(id: &str, role: Role) -> user::Model {
    user::Model {
        id: id.to_string(),
        name: format!("User {id}"),
        email: format!("{id}@example.com"),
        password_hash: String::new(),
        role,
        status: UserStatus::Active,
        phone: None,
        avatar_url: None,
        bio: None,
        skills: json!([]),
        last_login_at: None,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

/// An event starting tomorrow and lasting three hours.
pub fn event(id: &str, created_by: &str, status: EventStatus) -> event::Model {
    let start = Utc::now() + Duration::days(1);
    event::Model {
        id: id.to_string(),
        title: "Beach cleanup".to_string(),
        description: "Bring gloves".to_string(),
        location: "North pier".to_string(),
        start_date: start.into(),
        end_date: (start + Duration::hours(3)).into(),
        max_participants: 10,
        current_participants: 0,
        tags: json!(["environment"]),
        image_url: None,
        status,
        created_by: created_by.to_string(),
        channel_id: None,
        approval_request_id: None,
        cancellation_reason: None,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

pub fn registration(
    id: &str,
    user_id: &str,
    event_id: &str,
    status: RegistrationStatus,
) -> registration::Model {
    registration::Model {
        id: id.to_string(),
        user_id: user_id.to_string(),
        event_id: event_id.to_string(),
        status,
        qr_token: (status == RegistrationStatus::Registered).then(|| format!("tok-{id}")),
        registered_at: Utc::now().into(),
        cancelled_at: None,
        updated_at: None,
    }
}

pub fn channel(id: &str, event_id: &str) -> channel::Model {
    channel::Model {
        id: id.to_string(),
        event_id: event_id.to_string(),
        name: "Beach cleanup".to_string(),
        description: None,
        posts_count: 0,
        last_posted_at: None,
        created_at: Utc::now().into(),
    }
}
