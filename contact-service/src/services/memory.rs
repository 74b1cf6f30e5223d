//! In-process store and token issuer.
//!
//! Used by the integration tests and for running the HTTP surface without
//! Postgres or a media backend. Mirrors the Postgres store's semantics,
//! including the atomic request transitions (a single mutex guards all state).

use crate::models::{
    AvatarColumns, AvatarToken, AvatarVisibility, BlockStatus, ContactRequestRow, ContactRow,
    CoreProfile, IssuedToken, NewContactRequest, NewProfile, ProfileRow, ProfileType,
    ProfileUpdate, RequestResolution, RequestStatus, ResolveOutcome, UndoOutcome,
};
use crate::services::error::{IssuerError, StoreError};
use crate::services::store::{
    AvatarTokenStore, ContactGraphStore, ProfileStore, LOOKUP_HASH_CONFLICT, PROFILE_ID_CONFLICT,
};
use crate::services::token_issuer::MediaTokenIssuer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct UserRecord {
    lookup_hash: String,
    cipher_username: String,
    name: String,
    bio: Option<String>,
    profile_type: ProfileType,
    is_admin_blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    nickname: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RequestRecord {
    status: RequestStatus,
    nickname: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrivacyFlags {
    profile: bool,
    avatar: bool,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    blocks: HashSet<(Uuid, Uuid)>,
    global_privacy: HashMap<Uuid, PrivacyFlags>,
    exceptions: HashMap<(Uuid, Uuid), PrivacyFlags>,
    restrictions: HashMap<(Uuid, Uuid), PrivacyFlags>,
    contacts: HashMap<(Uuid, Uuid), EdgeRecord>,
    requests: HashMap<(Uuid, Uuid), RequestRecord>,
    avatars: HashMap<Uuid, AvatarToken>,
}

impl State {
    /// Privacy columns of `peer` as seen by `viewer`.
    fn visibility(&self, peer: Uuid, viewer: Uuid) -> AvatarVisibility {
        let global = self.global_privacy.get(&peer).copied().unwrap_or_default();
        let exception = self.exceptions.get(&(peer, viewer)).copied().unwrap_or_default();
        let restriction = self.restrictions.get(&(peer, viewer)).copied().unwrap_or_default();
        AvatarVisibility {
            global_restrict_profile: global.profile,
            exception_global_profile: exception.profile,
            global_restrict_avatar: global.avatar,
            exception_global_avatar: exception.avatar,
            user_restrict_profile: restriction.profile,
            user_restrict_avatar: restriction.avatar,
        }
    }

    fn avatar_columns(&self, user: Uuid) -> AvatarColumns {
        self.avatars
            .get(&user)
            .map(|t| AvatarColumns {
                avatar_file_id: Some(t.file_id.clone()),
                avatar_token_id: t.token_id.clone(),
                avatar_token_secret: t.token_secret.clone(),
                avatar_token_expiry: t.expiry,
            })
            .unwrap_or_default()
    }

    fn contact_row(&self, peer: Uuid, viewer: Uuid, edge: &EdgeRecord, own_edge: bool) -> Option<ContactRow> {
        let user = self.users.get(&peer)?;
        Some(ContactRow {
            id: peer,
            name: user.name.clone(),
            cipher_username: user.cipher_username.clone(),
            bio: user.bio.clone(),
            nickname: if own_edge { edge.nickname.clone() } else { None },
            created_at: edge.created_at,
            updated_at: edge.updated_at,
            avatar: self.avatar_columns(peer),
            visibility: self.visibility(peer, viewer),
        })
    }

    fn request_row(&self, peer: Uuid, viewer: Uuid, request: &RequestRecord, with_nickname: bool) -> Option<ContactRequestRow> {
        let user = self.users.get(&peer)?;
        Some(ContactRequestRow {
            id: peer,
            name: user.name.clone(),
            cipher_username: user.cipher_username.clone(),
            bio: user.bio.clone(),
            nickname: if with_nickname { request.nickname.clone() } else { None },
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
            avatar: self.avatar_columns(peer),
            visibility: self.visibility(peer, viewer),
        })
    }

    fn profile_row(&self, id: Uuid) -> Option<ProfileRow> {
        let user = self.users.get(&id)?;
        Some(ProfileRow {
            id,
            cipher_username: user.cipher_username.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            profile_type: user.profile_type,
            created_at: user.created_at,
            updated_at: user.updated_at,
            avatar: self.avatar_columns(id),
        })
    }
}

/// Newest first, like the Postgres listings.
fn newest_first<T>(rows: &mut [T], created_at: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checked(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(self.state())
    }

    /// Make every store call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_admin_blocked(&self, user_id: Uuid, blocked: bool) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            user.is_admin_blocked = blocked;
        }
    }

    pub fn set_profile_type(&self, user_id: Uuid, profile_type: ProfileType) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            user.profile_type = profile_type;
        }
    }

    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        self.state().blocks.insert((blocker, blocked));
    }

    /// `owner`'s settings for everyone.
    pub fn set_global_privacy(&self, owner: Uuid, restrict_profile: bool, restrict_avatar: bool) {
        self.state().global_privacy.insert(
            owner,
            PrivacyFlags {
                profile: restrict_profile,
                avatar: restrict_avatar,
            },
        );
    }

    /// `owner` lets `viewer` past a global restriction.
    pub fn set_privacy_exception(&self, owner: Uuid, viewer: Uuid, allow_profile: bool, allow_avatar: bool) {
        self.state().exceptions.insert(
            (owner, viewer),
            PrivacyFlags {
                profile: allow_profile,
                avatar: allow_avatar,
            },
        );
    }

    /// `owner` hides things from `viewer` specifically.
    pub fn set_privacy_restriction(&self, owner: Uuid, viewer: Uuid, restrict_profile: bool, restrict_avatar: bool) {
        self.state().restrictions.insert(
            (owner, viewer),
            PrivacyFlags {
                profile: restrict_profile,
                avatar: restrict_avatar,
            },
        );
    }

    /// Number of request rows for the ordered pair (0 or 1).
    pub fn request_rows(&self, requester: Uuid, receiver: Uuid) -> usize {
        usize::from(self.state().requests.contains_key(&(requester, receiver)))
    }

    pub fn contact_count(&self, owner: Uuid) -> usize {
        self.state().contacts.keys().filter(|(o, _)| *o == owner).count()
    }
}

#[async_trait]
impl ContactGraphStore for InMemoryStore {
    async fn list_owned_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError> {
        let state = self.checked()?;
        let mut rows: Vec<ContactRow> = state
            .contacts
            .iter()
            .filter(|((owner, _), _)| *owner == owner_id)
            .filter_map(|((_, contact), edge)| state.contact_row(*contact, owner_id, edge, true))
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn list_reverse_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError> {
        let state = self.checked()?;
        let mut rows: Vec<ContactRow> = state
            .contacts
            .iter()
            .filter(|((_, contact), _)| *contact == owner_id)
            .filter_map(|((adder, _), edge)| state.contact_row(*adder, owner_id, edge, false))
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn find_by_lookup_hash(&self, lookup_hash: &str) -> Result<Option<CoreProfile>, StoreError> {
        let state = self.checked()?;
        Ok(state
            .users
            .iter()
            .find(|(_, u)| u.lookup_hash == lookup_hash)
            .map(|(id, u)| CoreProfile {
                id: *id,
                profile_type: u.profile_type,
                is_admin_blocked: u.is_admin_blocked,
            }))
    }

    async fn core_profile(&self, user_id: Uuid) -> Result<Option<CoreProfile>, StoreError> {
        let state = self.checked()?;
        Ok(state.users.get(&user_id).map(|u| CoreProfile {
            id: user_id,
            profile_type: u.profile_type,
            is_admin_blocked: u.is_admin_blocked,
        }))
    }

    async fn block_status(&self, viewer_id: Uuid, other_id: Uuid) -> Result<BlockStatus, StoreError> {
        let state = self.checked()?;
        Ok(if state.blocks.contains(&(viewer_id, other_id)) {
            BlockStatus::Blocking
        } else if state.blocks.contains(&(other_id, viewer_id)) {
            BlockStatus::BlockedBy
        } else {
            BlockStatus::None
        })
    }

    async fn contact_exists(&self, owner_id: Uuid, contact_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.checked()?.contacts.contains_key(&(owner_id, contact_id)))
    }

    async fn insert_contact(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.checked()?;
        let now = Utc::now();
        state
            .contacts
            .entry((owner_id, contact_id))
            .or_insert_with(|| EdgeRecord {
                nickname: nickname.map(str::to_string),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn delete_contacts(&self, owner_id: Uuid, contact_ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut state = self.checked()?;
        let removed = contact_ids
            .iter()
            .filter(|contact| state.contacts.remove(&(owner_id, **contact)).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn update_nickname(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.checked()?;
        match state.contacts.get_mut(&(owner_id, contact_id)) {
            Some(edge) => {
                edge.nickname = nickname.map(str::to_string);
                edge.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn request_status(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<RequestStatus>, StoreError> {
        let state = self.checked()?;
        Ok(state
            .requests
            .get(&(requester_id, receiver_id))
            .map(|r| r.status))
    }

    async fn insert_request(&self, request: &NewContactRequest) -> Result<bool, StoreError> {
        let mut state = self.checked()?;
        let key = (request.requester_id, request.receiver_id);
        if state.requests.contains_key(&key) {
            return Ok(false);
        }
        let now = Utc::now();
        state.requests.insert(
            key,
            RequestRecord {
                status: RequestStatus::Pending,
                nickname: request.nickname.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn replace_request(&self, request: &NewContactRequest) -> Result<bool, StoreError> {
        let mut state = self.checked()?;
        let key = (request.requester_id, request.receiver_id);
        if state
            .requests
            .get(&key)
            .is_some_and(|existing| existing.status.is_pending())
        {
            return Ok(false);
        }
        let now = Utc::now();
        state.requests.insert(
            key,
            RequestRecord {
                status: RequestStatus::Pending,
                nickname: request.nickname.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn resolve_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
        resolution: RequestResolution,
    ) -> Result<ResolveOutcome, StoreError> {
        let mut state = self.checked()?;
        Ok(match state.requests.get_mut(&(requester_id, receiver_id)) {
            None => ResolveOutcome::NotFound,
            Some(request) if !request.status.is_pending() => ResolveOutcome::AlreadyResolved,
            Some(request) => {
                request.status = resolution.status();
                request.updated_at = Utc::now();
                ResolveOutcome::Resolved
            }
        })
    }

    async fn delete_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<UndoOutcome, StoreError> {
        let mut state = self.checked()?;
        let key = (requester_id, receiver_id);
        match state.requests.get(&key) {
            Some(request) if request.status.is_pending() => {
                state.requests.remove(&key);
                Ok(UndoOutcome::Undone)
            }
            _ => Ok(UndoOutcome::NotFound),
        }
    }

    async fn list_pending_requests_to(&self, user_id: Uuid) -> Result<Vec<ContactRequestRow>, StoreError> {
        let state = self.checked()?;
        let mut rows: Vec<ContactRequestRow> = state
            .requests
            .iter()
            .filter(|((_, receiver), r)| *receiver == user_id && r.status.is_pending())
            .filter_map(|((requester, _), r)| state.request_row(*requester, user_id, r, false))
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn list_requests_sent_by(&self, user_id: Uuid) -> Result<Vec<ContactRequestRow>, StoreError> {
        let state = self.checked()?;
        let mut rows: Vec<ContactRequestRow> = state
            .requests
            .iter()
            .filter(|((requester, _), _)| *requester == user_id)
            .filter_map(|((_, receiver), r)| state.request_row(*receiver, user_id, r, true))
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }
}

#[async_trait]
impl AvatarTokenStore for InMemoryStore {
    async fn avatar_token(&self, owner_id: Uuid) -> Result<Option<AvatarToken>, StoreError> {
        Ok(self.checked()?.avatars.get(&owner_id).cloned())
    }

    async fn save_avatar_token(&self, token: &AvatarToken) -> Result<(), StoreError> {
        self.checked()?.avatars.insert(token.owner_id, token.clone());
        Ok(())
    }

    async fn refresh_avatar_token(&self, token: &AvatarToken) -> Result<bool, StoreError> {
        let mut state = self.checked()?;
        match state.avatars.get_mut(&token.owner_id) {
            Some(existing) if existing.file_id == token.file_id => {
                *existing = token.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_avatar_token(&self, owner_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.checked()?.avatars.remove(&owner_id).is_some())
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn insert_profile(&self, profile: &NewProfile) -> Result<ProfileRow, StoreError> {
        let mut state = self.checked()?;
        if state.users.contains_key(&profile.id) {
            return Err(StoreError::Conflict(PROFILE_ID_CONFLICT.to_string()));
        }
        if state.users.values().any(|u| u.lookup_hash == profile.lookup_hash) {
            return Err(StoreError::Conflict(LOOKUP_HASH_CONFLICT.to_string()));
        }

        let now = Utc::now();
        state.users.insert(
            profile.id,
            UserRecord {
                lookup_hash: profile.lookup_hash.clone(),
                cipher_username: profile.cipher_text.clone(),
                name: profile.name.clone(),
                bio: None,
                profile_type: profile.profile_type,
                is_admin_blocked: false,
                created_at: now,
                updated_at: now,
            },
        );
        state
            .profile_row(profile.id)
            .ok_or_else(|| StoreError::Unavailable("profile vanished after insert".to_string()))
    }

    async fn lookup_hash_exists(&self, lookup_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .checked()?
            .users
            .values()
            .any(|u| u.lookup_hash == lookup_hash))
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        Ok(self.checked()?.profile_row(user_id))
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<bool, StoreError> {
        let mut state = self.checked()?;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(bio) = &update.bio {
            user.bio = bio.clone();
        }
        if let Some(profile_type) = update.profile_type {
            user.profile_type = profile_type;
        }
        user.updated_at = Utc::now();
        Ok(true)
    }
}

/// Token issuer that mints sequential tokens and records revocations.
#[derive(Default)]
pub struct MockTokenIssuer {
    issued: AtomicUsize,
    failing: AtomicBool,
    revoked: Mutex<Vec<String>>,
}

impl MockTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `issue` fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaTokenIssuer for MockTokenIssuer {
    async fn issue(
        &self,
        _bucket_id: &str,
        file_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<IssuedToken, IssuerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IssuerError::Status {
                status: 503,
                body: "issuer offline".to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IssuedToken {
            id: format!("tok_{n}"),
            secret: format!("secret_{file_id}_{n}"),
            expiry,
        })
    }

    async fn revoke(&self, token_id: &str) -> Result<(), IssuerError> {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token_id.to_string());
        Ok(())
    }
}
