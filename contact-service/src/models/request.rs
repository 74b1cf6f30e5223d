//! Contact requests: pending approvals between personal profiles.

use super::{AvatarColumns, AvatarVisibility};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown request status '{0}'")]
pub struct UnknownRequestStatus(pub String);

impl TryFrom<String> for RequestStatus {
    type Error = UnknownRequestStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            _ => Err(UnknownRequestStatus(value)),
        }
    }
}

/// How the receiver settles a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResolution {
    Accept,
    Decline,
}

impl RequestResolution {
    pub fn status(self) -> RequestStatus {
        match self {
            Self::Accept => RequestStatus::Accepted,
            Self::Decline => RequestStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    NotFound,
    AlreadyResolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone,
    NotFound,
}

/// A pending request about to be written.
#[derive(Debug, Clone)]
pub struct NewContactRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub receiver_id: Uuid,
    pub nickname: Option<String>,
}

impl NewContactRequest {
    pub fn pending(requester_id: Uuid, receiver_id: Uuid, nickname: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            requester_id,
            receiver_id,
            nickname,
        }
    }
}

/// A request joined with the peer's profile, avatar and privacy columns.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRequestRow {
    pub id: Uuid,
    pub name: String,
    pub cipher_username: String,
    pub bio: Option<String>,
    /// Nickname the requester chose for the receiver.
    pub nickname: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub avatar: AvatarColumns,
    #[sqlx(flatten)]
    pub visibility: AvatarVisibility,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactRequestEntry {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub nickname: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactRequestList {
    pub pending: Vec<ContactRequestEntry>,
    pub sent: Vec<ContactRequestEntry>,
}
