//! Profile identity models.

use super::AvatarColumns;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Visibility tier of a personal profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Public,
    Private,
    Personal,
}

impl ProfileType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Personal => "personal",
        }
    }
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown profile type '{0}'")]
pub struct UnknownProfileType(pub String);

impl std::str::FromStr for ProfileType {
    type Err = UnknownProfileType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "personal" => Ok(Self::Personal),
            other => Err(UnknownProfileType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProfileType {
    type Error = UnknownProfileType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The slice of a profile the contact rules need. Also the shape returned by a
/// lookup-hash search.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CoreProfile {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub profile_type: ProfileType,
    pub is_admin_blocked: bool,
}

/// Block relation between two users, seen from the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    None,
    /// The viewer blocked the other user.
    Blocking,
    /// The other user blocked the viewer.
    BlockedBy,
}

impl BlockStatus {
    /// Decode the store's tri-state code (0 none, 1 viewer blocked, 2 blocked by).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Blocking),
            2 => Some(Self::BlockedBy),
            _ => None,
        }
    }
}

/// Input for creating a profile whose username is already sealed.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub lookup_hash: String,
    pub cipher_text: String,
    pub name: String,
    pub profile_type: ProfileType,
}

/// Partial profile edit. `None` leaves a field untouched; `bio: Some(None)`
/// clears the bio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<Option<String>>,
    pub profile_type: Option<ProfileType>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.profile_type.is_none()
    }
}

/// Stored profile with its avatar columns.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub cipher_username: String,
    pub name: String,
    pub bio: Option<String>,
    #[sqlx(try_from = "String")]
    pub profile_type: ProfileType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub avatar: AvatarColumns,
}

/// Profile as shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct PrivateProfile {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_type: ProfileType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
