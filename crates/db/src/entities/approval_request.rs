//! Approval request entity.
//!
//! One table backs three workflows. The `request_type` column is kept for
//! filtering and indexing, while the type-specific data lives in `payload`
//! as the JSON encoding of [`ApprovalPayload`]. The two always agree: rows
//! are only built through [`ApprovalPayload::request_type`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discriminant of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[sea_orm(string_value = "event_approval")]
    EventApproval,
    #[sea_orm(string_value = "manager_promotion")]
    ManagerPromotion,
    #[sea_orm(string_value = "event_cancellation")]
    EventCancellation,
}

/// Review status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ApprovalStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Type-specific data of an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ApprovalPayload {
    /// A manager asks for a new event to be published.
    EventApproval { event_id: String },
    /// A volunteer asks to become a manager.
    ManagerPromotion {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        experience: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization: Option<String>,
    },
    /// An event creator asks for an approved event to be cancelled.
    EventCancellation { event_id: String, reason: String },
}

impl ApprovalPayload {
    /// The discriminant stored alongside the payload.
    #[must_use]
    pub const fn request_type(&self) -> ApprovalType {
        match self {
            Self::EventApproval { .. } => ApprovalType::EventApproval,
            Self::ManagerPromotion { .. } => ApprovalType::ManagerPromotion,
            Self::EventCancellation { .. } => ApprovalType::EventCancellation,
        }
    }

    /// The event this request is about, if any.
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::EventApproval { event_id } | Self::EventCancellation { event_id, .. } => {
                Some(event_id)
            }
            Self::ManagerPromotion { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_request")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub request_type: ApprovalType,

    #[sea_orm(indexed)]
    pub requester_id: String,

    /// Denormalized from the payload for event-scoped lookups
    #[sea_orm(indexed, nullable)]
    pub event_id: Option<String>,

    /// JSON encoding of [`ApprovalPayload`]
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    #[sea_orm(indexed)]
    pub status: ApprovalStatus,

    #[sea_orm(nullable)]
    pub reviewed_by: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub review_note: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub reviewed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Decode the typed payload.
    ///
    /// Fails when the stored JSON does not decode or disagrees with
    /// `request_type`.
    pub fn typed_payload(&self) -> Result<ApprovalPayload, serde_json::Error> {
        let payload: ApprovalPayload = serde_json::from_value(self.payload.clone())?;
        if payload.request_type() != self.request_type {
            return Err(serde::de::Error::custom(format!(
                "payload type {:?} does not match request type {:?}",
                payload.request_type(),
                self.request_type
            )));
        }
        Ok(payload)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RequesterId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Requester,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ReviewedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    Reviewer,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Requester.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
