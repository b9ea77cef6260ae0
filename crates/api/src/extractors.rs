//! Request extractors.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;
use volunteer_common::AppError;
use volunteer_db::entities::user;

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 20;

/// Largest page size a client may ask for.
pub const MAX_LIMIT: u64 = 100;

/// Why the auth middleware refused a presented token.
///
/// Stored in request extensions so handlers that require a user can report
/// 403 for deactivated accounts instead of a generic 401.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    Invalid,
    Inactive(String),
}

impl From<AuthRejection> for AppError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::Invalid => Self::Unauthorized,
            AuthRejection::Inactive(message) => Self::Forbidden(message),
        }
    }
}

fn current_user(parts: &Parts) -> Result<user::Model, AppError> {
    if let Some(user) = parts.extensions.get::<user::Model>() {
        return Ok(user.clone());
    }

    Err(parts
        .extensions
        .get::<AuthRejection>()
        .cloned()
        .map_or(AppError::Unauthorized, AppError::from))
}

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts).map(AuthUser)
    }
}

/// Authenticated manager or administrator.
#[derive(Debug, Clone)]
pub struct StaffUser(pub user::Model);

impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)?;
        if !user.role.is_staff() {
            return Err(AppError::Forbidden(
                "Manager or admin access required".to_string(),
            ));
        }
        Ok(Self(user))
    }
}

/// Authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub user::Model);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts)?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page: Option<u64>,
    limit: Option<u64>,
}

/// `?page=&limit=` with defaults and bounds applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    /// Normalize raw query values.
    #[must_use]
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<PageParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(Self::new(params.page, params.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p, Pagination { page: 1, limit: 20 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!(p, Pagination { page: 1, limit: MAX_LIMIT });

        let p = Pagination::new(Some(3), Some(0));
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(Some(4), Some(25)).offset(), 75);
    }

    #[test]
    fn test_rejection_maps_to_error() {
        assert!(matches!(
            AppError::from(AuthRejection::Invalid),
            AppError::Unauthorized
        ));
        assert!(matches!(
            AppError::from(AuthRejection::Inactive("off".to_string())),
            AppError::Forbidden(_)
        ));
    }
}
