//! Persistence seams consumed by the contact, profile and token services.
//!
//! Every method is a single logical query. Methods that must be atomic
//! (`replace_request`, `resolve_request`, `delete_request`) are atomic inside
//! the implementation; callers never compose them into transactions.

use crate::models::{
    AvatarToken, BlockStatus, ContactRequestRow, ContactRow, CoreProfile, NewContactRequest,
    NewProfile, ProfileRow, ProfileUpdate, RequestResolution, RequestStatus, ResolveOutcome, UndoOutcome,
};
use crate::services::error::StoreError;
use async_trait::async_trait;
use uuid::Uuid;

/// Conflict tag reported when a lookup hash is already taken.
pub const LOOKUP_HASH_CONFLICT: &str = "lookup_hash";
/// Conflict tag reported when a profile already exists for the identity.
pub const PROFILE_ID_CONFLICT: &str = "profile_id";

#[async_trait]
pub trait ContactGraphStore: Send + Sync {
    /// Contacts `owner_id` added, joined with each contact's profile.
    async fn list_owned_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError>;

    /// Users who added `owner_id`, joined with each adder's profile.
    async fn list_reverse_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError>;

    async fn find_by_lookup_hash(&self, lookup_hash: &str)
        -> Result<Option<CoreProfile>, StoreError>;

    async fn core_profile(&self, user_id: Uuid) -> Result<Option<CoreProfile>, StoreError>;

    /// Block relation seen from `viewer_id`.
    async fn block_status(&self, viewer_id: Uuid, other_id: Uuid)
        -> Result<BlockStatus, StoreError>;

    async fn contact_exists(&self, owner_id: Uuid, contact_id: Uuid) -> Result<bool, StoreError>;

    /// Insert an edge; an existing edge is left untouched.
    async fn insert_contact(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Remove the listed edges, returning how many existed.
    async fn delete_contacts(&self, owner_id: Uuid, contact_ids: &[Uuid])
        -> Result<u64, StoreError>;

    /// Set or clear the nickname. False when the edge does not exist.
    async fn update_nickname(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn request_status(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<RequestStatus>, StoreError>;

    /// Insert a pending request. False when a row already exists for the pair.
    async fn insert_request(&self, request: &NewContactRequest) -> Result<bool, StoreError>;

    /// Replace a resolved request with a new pending one. False when the
    /// existing row is still pending.
    async fn replace_request(&self, request: &NewContactRequest) -> Result<bool, StoreError>;

    /// Move a pending request to its resolved status.
    async fn resolve_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
        resolution: RequestResolution,
    ) -> Result<ResolveOutcome, StoreError>;

    /// Delete a still-pending request.
    async fn delete_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<UndoOutcome, StoreError>;

    /// Pending requests addressed to `user_id`, peer = requester.
    async fn list_pending_requests_to(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ContactRequestRow>, StoreError>;

    /// Requests `user_id` sent, peer = receiver.
    async fn list_requests_sent_by(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ContactRequestRow>, StoreError>;
}

#[async_trait]
pub trait AvatarTokenStore: Send + Sync {
    async fn avatar_token(&self, owner_id: Uuid) -> Result<Option<AvatarToken>, StoreError>;

    /// Insert or overwrite the owner's token row.
    async fn save_avatar_token(&self, token: &AvatarToken) -> Result<(), StoreError>;

    /// Overwrite the credential of an existing row for the same media object.
    /// False when the row was removed or now points at another file.
    async fn refresh_avatar_token(&self, token: &AvatarToken) -> Result<bool, StoreError>;

    /// False when no row existed.
    async fn delete_avatar_token(&self, owner_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fails with `StoreError::Conflict` tagged [`LOOKUP_HASH_CONFLICT`] or
    /// [`PROFILE_ID_CONFLICT`].
    async fn insert_profile(&self, profile: &NewProfile) -> Result<ProfileRow, StoreError>;

    async fn lookup_hash_exists(&self, lookup_hash: &str) -> Result<bool, StoreError>;

    async fn profile(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError>;

    /// Apply the provided fields. Returns false when the profile does not exist.
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<bool, StoreError>;
}
