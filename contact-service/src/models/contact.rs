//! One-way contact edges and their views.

use super::{AvatarColumns, AvatarVisibility, ProfileType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A contact edge joined with the peer's profile, avatar and privacy columns.
///
/// For owned contacts the peer is the contact, for reverse contacts the peer
/// is the owner who added the viewer. `nickname` is the edge's own nickname.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRow {
    pub id: Uuid,
    pub name: String,
    pub cipher_username: String,
    pub bio: Option<String>,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub avatar: AvatarColumns,
    #[sqlx(flatten)]
    pub visibility: AvatarVisibility,
}

#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub avatar_url: Option<String>,
    pub is_mutual: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactList {
    pub contacts: Vec<Contact>,
    pub people_who_added_you: Vec<Contact>,
}

/// Result of searching for a user by username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactExistence {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<ProfileType>,
    /// Only set for non-private profiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_user_id: Option<Uuid>,
}

impl ContactExistence {
    pub fn absent() -> Self {
        Self::default()
    }
}
