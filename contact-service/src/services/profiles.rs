use crate::models::{ContactOutcome, PrivateProfile, ProfileRow, ProfileType, ProfileUpdate};
use crate::services::error::{ContactError, StoreError};
use crate::services::identity_cipher::{IdentityCipher, UnassignedUsername};
use crate::services::store::{ProfileStore, LOOKUP_HASH_CONFLICT};
use crate::services::token_cache::AccessTokenCache;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts at drawing an unused username before giving up.
const USERNAME_ATTEMPTS: usize = 3;

const MAX_NAME_CHARS: usize = 40;
const MAX_BIO_CHARS: usize = 150;

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    cipher: IdentityCipher,
    tokens: AccessTokenCache,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>, cipher: IdentityCipher, tokens: AccessTokenCache) -> Self {
        Self {
            store,
            cipher,
            tokens,
        }
    }

    /// Create the personal profile for an authenticated identity with a
    /// freshly generated, sealed username.
    #[instrument(skip(self, name, email), fields(user_id = %user_id, profile_type = %profile_type))]
    pub async fn create_profile(
        &self,
        user_id: Uuid,
        name: &str,
        email: Option<String>,
        profile_type: ProfileType,
    ) -> Result<PrivateProfile, ContactError> {
        if self.store.profile(user_id).await?.is_some() {
            return Err(ContactError::Conflict("profile_already_exists"));
        }

        for attempt in 1..=USERNAME_ATTEMPTS {
            let sealed = UnassignedUsername::generate().seal(&self.cipher, user_id)?;
            if self.store.lookup_hash_exists(sealed.lookup_hash()).await? {
                warn!(attempt, "Generated username already taken");
                continue;
            }

            let username = sealed.plaintext().to_string();
            let new_profile = sealed.into_new_profile(name.trim().to_string(), profile_type);
            match self.store.insert_profile(&new_profile).await {
                Ok(row) => {
                    info!("Profile created");
                    return Ok(private_view(row, username, email, None));
                }
                Err(StoreError::Conflict(tag)) if tag == LOOKUP_HASH_CONFLICT => {
                    warn!(attempt, "Username taken concurrently");
                }
                Err(StoreError::Conflict(_)) => {
                    return Err(ContactError::Conflict("profile_already_exists"));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ContactError::Conflict("username_collision"))
    }

    /// The caller's own profile with the username decrypted and a fresh
    /// avatar URL.
    #[instrument(skip(self, email), fields(user_id = %user_id))]
    pub async fn get_profile(
        &self,
        user_id: Uuid,
        email: Option<String>,
    ) -> Result<PrivateProfile, ContactError> {
        let row = self
            .store
            .profile(user_id)
            .await?
            .ok_or(ContactError::NotFound("profile_not_found"))?;

        let username = self.cipher.decrypt(&row.cipher_username)?;
        let avatar_url = self.tokens.avatar_url(user_id, &row.avatar).await?;
        Ok(private_view(row, username, email, avatar_url))
    }

    /// Change any of name, bio and profile type. Names are trimmed and may not
    /// be blank; a blank bio clears it.
    #[instrument(skip(self, name, bio), fields(user_id = %user_id))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        name: Option<&str>,
        bio: Option<&str>,
        profile_type: Option<ProfileType>,
    ) -> Result<ContactOutcome, ContactError> {
        let name = match name.map(str::trim) {
            Some(n) if n.is_empty() || n.chars().count() > MAX_NAME_CHARS => {
                return Err(ContactError::BadRequest("invalid_name"));
            }
            other => other.map(str::to_string),
        };
        let bio = match bio.map(str::trim) {
            Some(b) if b.chars().count() > MAX_BIO_CHARS => {
                return Err(ContactError::BadRequest("invalid_bio"));
            }
            Some("") => Some(None),
            other => other.map(|b| Some(b.to_string())),
        };

        let update = ProfileUpdate {
            name,
            bio,
            profile_type,
        };
        if update.is_empty() {
            return Err(ContactError::BadRequest("invalid_request_payload"));
        }

        if !self.store.update_profile(user_id, &update).await? {
            return Err(ContactError::NotFound("profile_not_found"));
        }
        info!(profile_type = ?update.profile_type, "Profile updated");
        Ok(ContactOutcome::ProfileUpdated)
    }

    /// Record a newly uploaded avatar, replacing any previous one. The
    /// previous avatar survives a failed issuance.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn attach_avatar(&self, user_id: Uuid, file_id: &str) -> Result<ContactOutcome, ContactError> {
        if self.store.profile(user_id).await?.is_none() {
            return Err(ContactError::NotFound("profile_not_found"));
        }

        self.tokens.register(user_id, file_id).await?;
        Ok(ContactOutcome::AvatarUploaded)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn remove_avatar(&self, user_id: Uuid) -> Result<ContactOutcome, ContactError> {
        self.tokens.evict(user_id).await?;
        Ok(ContactOutcome::AvatarRemoved)
    }
}

fn private_view(
    row: ProfileRow,
    username: String,
    email: Option<String>,
    avatar_url: Option<String>,
) -> PrivateProfile {
    PrivateProfile {
        id: row.id,
        username,
        name: row.name,
        email,
        bio: row.bio,
        avatar_url,
        profile_type: row.profile_type,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
