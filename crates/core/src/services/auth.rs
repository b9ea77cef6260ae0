//! Authentication service: sign-up, sign-in, passwords and access tokens.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;
use volunteer_common::config::AuthConfig;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::user::{self, Role, UserStatus},
    repositories::{ApprovalRequestRepository, UserRepository},
};

use crate::services::approval::{PromotionInput, new_request, notify_admins};
use crate::services::notification::NotificationService;

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Role at issue time; the middleware trusts the stored role instead.
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Input for creating an account.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    /// Ask to become a manager right away.
    #[validate(nested)]
    pub manager_request: Option<PromotionInput>,
}

/// Input for signing in.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Input for changing the caller's password.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// A signed-in user with a fresh token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: user::Model,
    pub token: String,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    notification_service: NotificationService,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    id_gen: IdGenerator,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        user_repo: UserRepository,
        notification_service: NotificationService,
        config: &AuthConfig,
    ) -> Self {
        Self {
            db,
            user_repo,
            notification_service,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(config.token_ttl_hours),
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an account, plus a promotion request when asked for.
    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthSession> {
        input.validate()?;

        let email = normalize_email(&input.email);
        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let user_id = self.id_gen.generate();
        let model = user::ActiveModel {
            id: Set(user_id.clone()),
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(hash_password(&input.password)?),
            role: Set(Role::Volunteer),
            status: Set(UserStatus::Active),
            phone: Set(input.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())),
            avatar_url: Set(None),
            bio: Set(None),
            skills: Set(serde_json::json!([])),
            last_login_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let user = UserRepository::create_in(&txn, model).await?;
        let request = match input.manager_request {
            Some(promotion) => {
                let payload = promotion.into_payload();
                let request = new_request(self.id_gen.generate(), &user_id, &payload)?;
                Some(ApprovalRequestRepository::create_in(&txn, request).await?)
            }
            None => None,
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(user_id = %user.id, promotion = request.is_some(), "User registered");

        if let Some(ref request) = request {
            notify_admins(
                &self.user_repo,
                &self.notification_service,
                request,
                format!("{} signed up and asked to become an event manager", user.name),
            )
            .await;
        }

        let token = self.issue_token(&user)?;
        Ok(AuthSession { user, token })
    }

    /// Sign in with e-mail and password.
    pub async fn login(&self, input: LoginInput) -> AppResult<AuthSession> {
        input.validate()?;

        let user = self
            .user_repo
            .find_by_email(&normalize_email(&input.email))
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }
        if !user.is_active() {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }

        self.user_repo.touch_last_login(&user.id).await?;
        let token = self.issue_token(&user)?;
        Ok(AuthSession { user, token })
    }

    /// Change the caller's password after checking the current one.
    pub async fn change_password(
        &self,
        user: &user::Model,
        input: ChangePasswordInput,
    ) -> AppResult<()> {
        input.validate()?;

        if !verify_password(&input.current_password, &user.password_hash)? {
            return Err(AppError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        let mut active: user::ActiveModel = user.clone().into();
        active.password_hash = Set(hash_password(&input.new_password)?);
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;
        Ok(())
    }

    /// Sign an access token for a user.
    pub fn issue_token(&self, user: &user::Model) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Check a token's signature and expiry.
    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }

    /// Resolve a bearer token to its current user.
    ///
    /// The user is re-read on every call, so deactivation and role changes
    /// apply to tokens already issued.
    pub async fn authenticate(&self, token: &str) -> AppResult<user::Model> {
        let claims = self.verify_token(token)?;
        let user = self
            .user_repo
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !user.is_active() {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use volunteer_db::repositories::NotificationRepository;

    fn service(db: MockDatabase) -> AuthService {
        let db = Arc::new(db.into_connection());
        AuthService::new(
            db.clone(),
            UserRepository::new(db.clone()),
            NotificationService::new(NotificationRepository::new(db)),
            &AuthConfig {
                jwt_secret: "test-secret".to_string(),
                token_ttl_hours: 24,
            },
        )
    }

    fn user_with_password(id: &str, password: &str, status: UserStatus) -> user::Model {
        let mut user = fixtures::user(id, Role::Volunteer);
        user.password_hash = hash_password(password).unwrap();
        user.status = status;
        user
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            phone: None,
            manager_request: None,
        }
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("test_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_token_round_trip() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let user = fixtures::user("u1", Role::Manager);

        let token = service.issue_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_expired_and_foreign_tokens_are_unauthorized() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let past = Utc::now() - Duration::hours(3);
        let expired = Claims {
            sub: "u1".to_string(),
            role: Role::Volunteer,
            iat: past.timestamp(),
            exp: (past + Duration::hours(1)).timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &expired,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(service.verify_token(&token), Err(AppError::Unauthorized)));

        let foreign = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
                ..expired
            },
            &EncodingKey::from_secret(b"someone-else"),
        )
        .unwrap();
        assert!(matches!(service.verify_token(&foreign), Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_register_creates_volunteer() {
        let created = fixtures::user("u1", Role::Volunteer);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([[created]]);
        let service = service(db);

        let session = service.register(register_input("Ada@Example.com")).await.unwrap();

        assert_eq!(session.user.role, Role::Volunteer);
        assert_eq!(service.verify_token(&session.token).unwrap().sub, "u1");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::user("u1", Role::Volunteer)]]);
        let service = service(db);

        let result = service.register(register_input("u1@example.com")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_validates_nested_promotion() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let mut input = register_input("ada@example.com");
        input.manager_request = Some(PromotionInput {
            reason: "short".to_string(),
            experience: None,
            organization: None,
        });

        let result = service.register(input).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()]);
        let service = service(db);

        let result = service
            .login(LoginInput {
                email: "nobody@example.com".to_string(),
                password: "whatever".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            user_with_password("u1", "correct horse", UserStatus::Active),
        ]]);
        let service = service(db);

        let result = service
            .login(LoginInput {
                email: "u1@example.com".to_string(),
                password: "battery staple".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_login_inactive_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            user_with_password("u1", "correct horse", UserStatus::Inactive),
        ]]);
        let service = service(db);

        let result = service
            .login(LoginInput {
                email: "u1@example.com".to_string(),
                password: "correct horse".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_login_success_touches_last_login() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[user_with_password(
                "u1",
                "correct horse",
                UserStatus::Active,
            )]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);
        let service = service(db);

        let session = service
            .login(LoginInput {
                email: " U1@example.com ".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.user.id, "u1");
    }

    #[tokio::test]
    async fn test_authenticate_rejects_deactivated_user() {
        let mut user = fixtures::user("u1", Role::Volunteer);
        user.status = UserStatus::Inactive;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[user.clone()]]);
        let service = service(db);

        let token = service.issue_token(&user).unwrap();
        let result = service.authenticate(&token).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_change_password_checks_current() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let user = user_with_password("u1", "correct horse", UserStatus::Active);

        let result = service
            .change_password(
                &user,
                ChangePasswordInput {
                    current_password: "nope".to_string(),
                    new_password: "battery staple".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
