//! Avatar access tokens and the privacy gate deciding who may see them.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Avatar columns as they appear joined onto a profile, contact or request row.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct AvatarColumns {
    pub avatar_file_id: Option<String>,
    pub avatar_token_id: Option<String>,
    pub avatar_token_secret: Option<String>,
    pub avatar_token_expiry: Option<DateTime<Utc>>,
}

impl AvatarColumns {
    /// The stored token for `owner_id`, or `None` when no media object exists.
    pub fn token(&self, owner_id: Uuid) -> Option<AvatarToken> {
        let file_id = self.avatar_file_id.as_deref().filter(|id| !id.is_empty())?;
        Some(AvatarToken {
            owner_id,
            file_id: file_id.to_string(),
            token_id: self.avatar_token_id.clone(),
            token_secret: self.avatar_token_secret.clone(),
            expiry: self.avatar_token_expiry,
        })
    }
}

/// Read credential for one stored media object.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AvatarToken {
    pub owner_id: Uuid,
    pub file_id: String,
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl AvatarToken {
    /// True when the token cannot be handed out as of `now`: no expiry recorded,
    /// or an expiry at or before `now + grace`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) => expiry <= now + grace,
        }
    }

    /// Replace the credential with a freshly issued one.
    pub fn with_issued(&self, issued: &IssuedToken) -> Self {
        Self {
            owner_id: self.owner_id,
            file_id: self.file_id.clone(),
            token_id: Some(issued.id.clone()),
            token_secret: Some(issued.secret.clone()),
            expiry: Some(issued.expiry),
        }
    }

    /// Reference usable for building a display URL: `[token_id, token_secret]`,
    /// skipping parts that are missing.
    pub fn file_ref(&self) -> FileRef {
        let token_parts = [&self.token_id, &self.token_secret]
            .into_iter()
            .filter_map(|part| part.as_deref().filter(|p| !p.is_empty()))
            .map(str::to_string)
            .collect();
        FileRef {
            file_id: self.file_id.clone(),
            token_parts,
        }
    }
}

/// Token returned by the media token issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub id: String,
    pub secret: String,
    pub expiry: DateTime<Utc>,
}

/// A media object plus whatever token parts are known for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_id: String,
    pub token_parts: Vec<String>,
}

/// Privacy columns governing whether a peer's avatar is shown to the viewer.
///
/// `global_*` are the peer's settings for everyone, `exception_*` are the peer's
/// explicit allowances for this viewer, `user_*` are the peer's restrictions on
/// this viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct AvatarVisibility {
    pub global_restrict_profile: bool,
    pub exception_global_profile: bool,
    pub global_restrict_avatar: bool,
    pub exception_global_avatar: bool,
    pub user_restrict_profile: bool,
    pub user_restrict_avatar: bool,
}

impl AvatarVisibility {
    /// Ordered precedence: a global restriction decides alone (through its
    /// exception); per-viewer restrictions only count when no global rule applies.
    pub fn exposes_avatar(&self) -> bool {
        match *self {
            Self {
                global_restrict_profile: true,
                exception_global_profile,
                ..
            } => exception_global_profile,
            Self {
                global_restrict_avatar: true,
                exception_global_avatar,
                ..
            } => exception_global_avatar,
            Self {
                user_restrict_profile: true,
                ..
            }
            | Self {
                user_restrict_avatar: true,
                ..
            } => false,
            _ => true,
        }
    }
}
