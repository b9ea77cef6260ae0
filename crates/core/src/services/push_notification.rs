//! Push notification service for Web Push.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;
use volunteer_common::config::PushConfig;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::entities::{notification, push_subscription};
use volunteer_db::repositories::{MAX_FAIL_COUNT, PushSubscriptionRepository};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

/// Seconds a push service may hold an undelivered message.
const PUSH_TTL_SECONDS: u32 = 24 * 60 * 60;

/// Browser subscription keys.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubscriptionKeys {
    /// P-256 ECDH public key (base64url)
    #[validate(length(min = 1, max = 256))]
    pub p256dh: String,
    /// Auth secret (base64url)
    #[validate(length(min = 1, max = 128))]
    pub auth: String,
}

/// Input for registering a push subscription, in the shape the browser's
/// `PushSubscription.toJSON()` produces.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeInput {
    /// Push service endpoint URL
    #[validate(url, length(max = 2048))]
    pub endpoint: String,
    #[validate(nested)]
    pub keys: SubscriptionKeys,
}

/// Public Web Push configuration for clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfigResponse {
    /// Whether the server can send push messages
    pub enabled: bool,
    /// VAPID public key to pass to `pushManager.subscribe`
    pub public_key: Option<String>,
}

/// Payload delivered to the service worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    /// Notification ID
    pub id: String,
    /// Notification kind
    #[serde(rename = "type")]
    pub kind: notification::NotificationKind,
    pub title: String,
    pub body: String,
    /// Route to open when clicked
    pub url: Option<String>,
}

impl From<&notification::Model> for PushPayload {
    fn from(n: &notification::Model) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind,
            title: n.title.clone(),
            body: n.message.clone(),
            url: n.link.clone(),
        }
    }
}

/// Why a single delivery failed.
#[derive(Debug)]
pub enum DeliveryError {
    /// The push service says the subscription no longer exists.
    Gone,
    /// Any other failure; the subscription is kept and its failure count
    /// increases.
    Failed(String),
}

/// Transport that hands one encrypted message to a push service.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver `payload` to one subscription.
    async fn deliver(
        &self,
        subscription: &push_subscription::Model,
        payload: &[u8],
    ) -> Result<(), DeliveryError>;
}

/// Web Push transport signing with VAPID and encrypting with aes128gcm.
pub struct WebPushTransport {
    client: IsahcWebPushClient,
    private_key: String,
    subject: String,
}

impl WebPushTransport {
    /// Create a transport from the VAPID configuration.
    pub fn new(config: &PushConfig) -> AppResult<Self> {
        let client = IsahcWebPushClient::new()
            .map_err(|e| AppError::Config(format!("Failed to create push client: {e}")))?;
        Ok(Self {
            client,
            private_key: config.vapid_private_key.clone(),
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &push_subscription::Model,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, base64::URL_SAFE_NO_PAD, &info)
                .map_err(|e| DeliveryError::Failed(format!("VAPID key: {e}")))?;
        signature.add_claim("sub", self.subject.clone());
        let signature = signature
            .build()
            .map_err(|e| DeliveryError::Failed(format!("VAPID signature: {e}")))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(PUSH_TTL_SECONDS);
        let message = builder
            .build()
            .map_err(|e| DeliveryError::Failed(format!("Message: {e}")))?;

        match self.client.send(message).await {
            Ok(()) => Ok(()),
            Err(WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. }) => {
                Err(DeliveryError::Gone)
            }
            Err(e) => Err(DeliveryError::Failed(e.to_string())),
        }
    }
}

/// Push notification service.
#[derive(Clone)]
pub struct PushNotificationService {
    repo: PushSubscriptionRepository,
    public_key: Option<String>,
    transport: Option<Arc<dyn PushTransport>>,
    id_gen: IdGenerator,
}

impl PushNotificationService {
    /// Create a new push notification service.
    ///
    /// Without a configuration subscriptions are still stored but nothing is
    /// sent.
    pub fn new(repo: PushSubscriptionRepository, config: Option<&PushConfig>) -> AppResult<Self> {
        let transport = match config {
            Some(c) => Some(Arc::new(WebPushTransport::new(c)?) as Arc<dyn PushTransport>),
            None => None,
        };
        Ok(Self {
            repo,
            public_key: config.map(|c| c.vapid_public_key.clone()),
            transport,
            id_gen: IdGenerator::new(),
        })
    }

    /// Create a service with a custom transport.
    #[must_use]
    pub fn with_transport(
        repo: PushSubscriptionRepository,
        public_key: Option<String>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            repo,
            public_key,
            transport: Some(transport),
            id_gen: IdGenerator::new(),
        }
    }

    /// Check if push notifications are enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Client-facing configuration.
    #[must_use]
    pub fn config(&self) -> PushConfigResponse {
        PushConfigResponse {
            enabled: self.is_enabled(),
            public_key: self.public_key.clone(),
        }
    }

    /// Register (or refresh) a subscription for a user.
    pub async fn subscribe(
        &self,
        user_id: &str,
        input: SubscribeInput,
        user_agent: Option<String>,
    ) -> AppResult<push_subscription::Model> {
        input.validate()?;

        if let Some(existing) = self.repo.find_by_endpoint(&input.endpoint).await? {
            if existing.user_id != user_id {
                return Err(AppError::Conflict(
                    "This push endpoint is already registered to another user".to_string(),
                ));
            }

            // Browsers rotate keys on resubscribe; start the failure count over.
            let mut active: push_subscription::ActiveModel = existing.into();
            active.auth = Set(input.keys.auth);
            active.p256dh = Set(input.keys.p256dh);
            active.user_agent = Set(user_agent);
            active.fail_count = Set(0);
            return self.repo.update(active).await;
        }

        let model = push_subscription::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            endpoint: Set(input.endpoint),
            auth: Set(input.keys.auth),
            p256dh: Set(input.keys.p256dh),
            user_agent: Set(user_agent),
            fail_count: Set(0),
            last_pushed_at: Set(None),
            created_at: Set(Utc::now().into()),
        };

        self.repo.create(model).await
    }

    /// Remove one of the user's subscriptions by endpoint.
    pub async fn unsubscribe(&self, user_id: &str, endpoint: &str) -> AppResult<()> {
        if self.repo.delete_by_endpoint(user_id, endpoint).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Subscription not found".to_string()))
        }
    }

    /// Send a notification to every deliverable subscription of its
    /// recipient. Returns the number of successful deliveries.
    pub async fn send_notification(&self, n: &notification::Model) -> AppResult<usize> {
        let Some(transport) = self.transport.as_ref() else {
            return Ok(0);
        };

        let subscriptions = self.repo.find_deliverable_by_user(&n.user_id).await?;
        if subscriptions.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_vec(&PushPayload::from(n))
            .map_err(|e| AppError::Internal(format!("Failed to serialize payload: {e}")))?;

        let mut success_count = 0;
        for subscription in subscriptions {
            if subscription.fail_count >= MAX_FAIL_COUNT {
                continue;
            }
            match transport.deliver(&subscription, &payload).await {
                Ok(()) => {
                    self.repo.mark_push_success(&subscription.id).await?;
                    success_count += 1;
                }
                Err(DeliveryError::Gone) => {
                    tracing::debug!(subscription_id = %subscription.id, "Removing expired push subscription");
                    self.repo.delete(&subscription.id).await?;
                }
                Err(DeliveryError::Failed(e)) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to send push notification"
                    );
                    self.repo.increment_fail_count(&subscription.id).await?;
                }
            }
        }

        Ok(success_count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Mutex;
    use volunteer_db::entities::notification::NotificationKind;

    struct ScriptedTransport {
        outcomes: Mutex<Vec<Result<(), DeliveryError>>>,
        delivered: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<(), DeliveryError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn deliver(
            &self,
            subscription: &push_subscription::Model,
            _payload: &[u8],
        ) -> Result<(), DeliveryError> {
            self.delivered
                .lock()
                .unwrap()
                .push(subscription.endpoint.clone());
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn subscription(id: &str, user_id: &str, fail_count: i32) -> push_subscription::Model {
        push_subscription::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            endpoint: format!("https://push.example.com/{id}"),
            auth: "auth".to_string(),
            p256dh: "p256dh".to_string(),
            user_agent: None,
            fail_count,
            last_pushed_at: None,
            created_at: Utc::now().into(),
        }
    }

    fn notification_for(user_id: &str) -> notification::Model {
        notification::Model {
            id: "n1".to_string(),
            user_id: user_id.to_string(),
            actor_id: None,
            kind: NotificationKind::WaitlistPromoted,
            title: "You're in".to_string(),
            message: "A seat opened up".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: Some("/events/e1".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    fn input(endpoint: &str) -> SubscribeInput {
        SubscribeInput {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: "p256dh".to_string(),
                auth: "auth".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_bad_vapid_key_fails_before_sending() {
        let transport = WebPushTransport::new(&PushConfig {
            vapid_public_key: "public".to_string(),
            vapid_private_key: "not a key!".to_string(),
            subject: "mailto:admin@example.com".to_string(),
        })
        .unwrap();

        let result = transport
            .deliver(&subscription("s1", "u1", 0), b"{}")
            .await;

        match result {
            Err(DeliveryError::Failed(message)) => assert!(message.starts_with("VAPID key")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_payload_from_notification() {
        let payload = PushPayload::from(&notification_for("u1"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "waitlist_promoted");
        assert_eq!(value["url"], "/events/e1");
        assert_eq!(value["body"], "A seat opened up");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_foreign_endpoint() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[subscription("s1", "other", 0)]])
            .into_connection();
        let service =
            PushNotificationService::new(PushSubscriptionRepository::new(Arc::new(db)), None)
                .unwrap();

        let result = service
            .subscribe("u1", input("https://push.example.com/s1"), None)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_invalid_endpoint() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service =
            PushNotificationService::new(PushSubscriptionRepository::new(Arc::new(db)), None)
                .unwrap();

        let result = service.subscribe("u1", input("not a url"), None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_disabled_service_sends_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service =
            PushNotificationService::new(PushSubscriptionRepository::new(Arc::new(db)), None)
                .unwrap();

        assert!(!service.config().enabled);
        assert_eq!(service.send_notification(&notification_for("u1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_handles_each_outcome() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                subscription("ok", "u1", 0),
                subscription("gone", "u1", 2),
                subscription("flaky", "u1", 1),
            ]])
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .into_connection();
        let transport = ScriptedTransport::new(vec![
            Ok(()),
            Err(DeliveryError::Gone),
            Err(DeliveryError::Failed("503".to_string())),
        ]);
        let service = PushNotificationService::with_transport(
            PushSubscriptionRepository::new(Arc::new(db)),
            Some("pub".to_string()),
            transport.clone(),
        );

        let sent = service.send_notification(&notification_for("u1")).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(transport.delivered.lock().unwrap().len(), 3);
    }
}
