//! Business logic services.

#![allow(missing_docs)]

pub mod approval;
pub mod attendance;
pub mod auth;
pub mod event;
pub mod event_publisher;
pub mod notification;
pub mod push_notification;
pub mod registration;
pub mod social;
pub mod user;

#[cfg(test)]
mod fixtures;

pub use approval::{ApprovalService, Decision, PromotionInput, ReviewInput};
pub use attendance::{
    AttendanceDetail, AttendanceService, AttendanceSummary, CheckInInput, EventAttendance,
    FeedbackInput,
};
pub use auth::{AuthService, AuthSession, ChangePasswordInput, Claims, LoginInput, RegisterInput};
pub use event::{
    CancellationInput, CreateEventInput, EventQuery, EventService, Participant, UpdateEventInput,
};
pub use event_publisher::{EventPublisher, EventPublisherService, StreamEvent};
pub use notification::{NewNotification, NotificationService};
pub use push_notification::{
    DeliveryError, PushConfigResponse, PushNotificationService, PushPayload, PushTransport,
    SubscribeInput, SubscriptionKeys, WebPushTransport,
};
pub use registration::{QrCode, RegistrationDetail, RegistrationService};
pub use social::{
    CommentView, CreateCommentInput, CreatePostInput, PostView, ReactInput, SocialService,
};
pub use user::{Dashboard, UpdateProfileInput, UserService};
