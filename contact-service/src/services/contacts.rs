//! Contact lifecycle for personal profiles.
//!
//! Contacts are one-way edges. Mutuality is never stored: a contact is mutual
//! when the reverse edge exists at read time. Accepting a request resolves it
//! but does not add the requester to the acceptor's contacts.

use crate::models::{
    AvatarColumns, AvatarVisibility, BlockStatus, Contact, ContactExistence, ContactList,
    ContactOutcome, ContactRequestEntry, ContactRequestList, ContactRequestRow, ContactRow,
    NewContactRequest, ProfileType, RequestResolution, RequestStatus, ResolveOutcome, UndoOutcome,
};
use crate::services::error::{ContactError, ForbiddenReason};
use crate::services::identity_cipher::IdentityCipher;
use crate::services::store::ContactGraphStore;
use crate::services::token_cache::AccessTokenCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Maximum nickname length in characters.
pub const NICKNAME_MAX_CHARS: usize = 40;

/// Trim a nickname; blank becomes `None`, over-long is rejected.
pub fn normalize_nickname(nickname: Option<&str>) -> Result<Option<String>, ContactError> {
    let Some(trimmed) = nickname.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > NICKNAME_MAX_CHARS {
        return Err(ContactError::BadRequest("invalid_nickname_length"));
    }
    Ok(Some(trimmed.to_string()))
}

fn reject_self(actor: Uuid, target: Uuid) -> Result<(), ContactError> {
    if actor == target {
        return Err(ContactError::SelfAction);
    }
    Ok(())
}

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn ContactGraphStore>,
    cipher: IdentityCipher,
    tokens: AccessTokenCache,
}

impl ContactService {
    pub fn new(
        store: Arc<dyn ContactGraphStore>,
        cipher: IdentityCipher,
        tokens: AccessTokenCache,
    ) -> Self {
        Self {
            store,
            cipher,
            tokens,
        }
    }

    /// Add `target` directly (public), request approval (personal) or refuse
    /// (private). Repeating the call converges on the same state.
    #[instrument(skip(self, nickname), fields(owner_id = %owner, target_id = %target))]
    pub async fn create_contact(
        &self,
        owner: Uuid,
        target: Uuid,
        nickname: Option<&str>,
    ) -> Result<ContactOutcome, ContactError> {
        reject_self(owner, target)?;

        let owner_blocked = self
            .store
            .core_profile(owner)
            .await?
            .is_some_and(|p| p.is_admin_blocked);
        if owner_blocked {
            return Err(ContactError::Forbidden(ForbiddenReason::SelfAdminBlocked));
        }

        let target_profile = self
            .store
            .core_profile(target)
            .await?
            .ok_or(ContactError::NotFound("user_not_found"))?;
        if target_profile.is_admin_blocked {
            return Err(ContactError::Forbidden(ForbiddenReason::UserAdminBlocked));
        }

        match self.store.block_status(owner, target).await? {
            BlockStatus::None => {}
            BlockStatus::Blocking => {
                return Err(ContactError::Forbidden(ForbiddenReason::YouBlockedUser))
            }
            BlockStatus::BlockedBy => {
                return Err(ContactError::Forbidden(ForbiddenReason::UserBlockedYou))
            }
        }

        if self.store.contact_exists(owner, target).await? {
            return Ok(ContactOutcome::AlreadyInContacts);
        }

        let nickname = normalize_nickname(nickname)?;

        match target_profile.profile_type {
            ProfileType::Private => Err(ContactError::Forbidden(ForbiddenReason::UserPrivateProfile)),
            ProfileType::Public => {
                self.store
                    .insert_contact(owner, target, nickname.as_deref())
                    .await?;
                info!("Public contact added");
                Ok(ContactOutcome::PublicContactAdded)
            }
            ProfileType::Personal => {
                let request = NewContactRequest::pending(owner, target, nickname);
                let written = match self.store.request_status(owner, target).await? {
                    Some(RequestStatus::Pending) => false,
                    Some(_) => self.store.replace_request(&request).await?,
                    None => self.store.insert_request(&request).await?,
                };
                if !written {
                    return Ok(ContactOutcome::PendingRequestExists);
                }
                info!(request_id = %request.id, "Contact request sent");
                Ok(ContactOutcome::ContactRequestSent)
            }
        }
    }

    #[instrument(skip(self), fields(receiver_id = %receiver, requester_id = %requester))]
    pub async fn accept_contact_request(
        &self,
        receiver: Uuid,
        requester: Uuid,
    ) -> Result<ContactOutcome, ContactError> {
        self.resolve(receiver, requester, RequestResolution::Accept)
            .await
            .map(|_| ContactOutcome::ContactRequestAccepted)
    }

    #[instrument(skip(self), fields(receiver_id = %receiver, requester_id = %requester))]
    pub async fn reject_contact_request(
        &self,
        receiver: Uuid,
        requester: Uuid,
    ) -> Result<ContactOutcome, ContactError> {
        self.resolve(receiver, requester, RequestResolution::Decline)
            .await
            .map(|_| ContactOutcome::ContactRequestDeclined)
    }

    async fn resolve(
        &self,
        receiver: Uuid,
        requester: Uuid,
        resolution: RequestResolution,
    ) -> Result<(), ContactError> {
        reject_self(receiver, requester)?;
        match self
            .store
            .resolve_request(requester, receiver, resolution)
            .await?
        {
            ResolveOutcome::Resolved => {
                info!(status = %resolution.status(), "Contact request resolved");
                Ok(())
            }
            ResolveOutcome::NotFound => Err(ContactError::NotFound("pending_request_not_found")),
            ResolveOutcome::AlreadyResolved => {
                Err(ContactError::Conflict("request_already_processed"))
            }
        }
    }

    /// Withdraw a pending request the caller sent.
    #[instrument(skip(self), fields(requester_id = %requester, receiver_id = %receiver))]
    pub async fn undo_contact_request(
        &self,
        requester: Uuid,
        receiver: Uuid,
    ) -> Result<ContactOutcome, ContactError> {
        reject_self(requester, receiver)?;
        match self.store.delete_request(requester, receiver).await? {
            UndoOutcome::Undone => Ok(ContactOutcome::ContactRequestUndone),
            UndoOutcome::NotFound => Err(ContactError::NotFound("pending_request_not_found")),
        }
    }

    /// Remove edges to `targets`. Missing edges are reported through the
    /// outcome, not as an error.
    #[instrument(skip(self, targets), fields(owner_id = %owner, requested = targets.len()))]
    pub async fn delete_contacts(
        &self,
        owner: Uuid,
        targets: &[Uuid],
    ) -> Result<ContactOutcome, ContactError> {
        let mut seen = HashSet::with_capacity(targets.len());
        let mut unique = Vec::with_capacity(targets.len());
        for &target in targets {
            reject_self(owner, target)?;
            if seen.insert(target) {
                unique.push(target);
            }
        }
        if unique.is_empty() {
            return Err(ContactError::BadRequest("invalid_request_payload"));
        }

        let removed = self.store.delete_contacts(owner, &unique).await?;
        info!(removed, "Contacts deleted");

        Ok(match (removed, unique.len()) {
            (1, 1) => ContactOutcome::ContactDeleted,
            (removed, requested) if removed as usize == requested => ContactOutcome::ContactsDeleted,
            (removed, requested) => ContactOutcome::ContactsDeletedPartial { removed, requested },
        })
    }

    #[instrument(skip(self, nickname), fields(owner_id = %owner, contact_id = %contact))]
    pub async fn update_contact_nickname(
        &self,
        owner: Uuid,
        contact: Uuid,
        nickname: Option<&str>,
    ) -> Result<ContactOutcome, ContactError> {
        reject_self(owner, contact)?;
        let nickname = normalize_nickname(nickname)?;
        if !self
            .store
            .update_nickname(owner, contact, nickname.as_deref())
            .await?
        {
            return Err(ContactError::NotFound("contact_not_found"));
        }
        Ok(ContactOutcome::NicknameUpdated)
    }

    #[instrument(skip(self), fields(owner_id = %owner, contact_id = %contact))]
    pub async fn remove_contact_nickname(
        &self,
        owner: Uuid,
        contact: Uuid,
    ) -> Result<ContactOutcome, ContactError> {
        reject_self(owner, contact)?;
        if !self.store.update_nickname(owner, contact, None).await? {
            return Err(ContactError::NotFound("contact_not_found"));
        }
        Ok(ContactOutcome::NicknameRemoved)
    }

    /// Search by username. Self-matches read as absent; private profiles never
    /// reveal their id.
    #[instrument(skip(self, username), fields(owner_id = %owner))]
    pub async fn check_contact_existence(
        &self,
        owner: Uuid,
        username: &str,
    ) -> Result<ContactExistence, ContactError> {
        let lookup_hash = self.cipher.hash(username.trim())?;
        let found = match self.store.find_by_lookup_hash(&lookup_hash).await? {
            Some(profile) if profile.id != owner => profile,
            _ => return Ok(ContactExistence::absent()),
        };

        Ok(ContactExistence {
            exists: true,
            profile_type: Some(found.profile_type),
            recipient_user_id: (found.profile_type != ProfileType::Private).then_some(found.id),
        })
    }

    #[instrument(skip(self), fields(owner_id = %owner))]
    pub async fn get_contacts(&self, owner: Uuid) -> Result<ContactList, ContactError> {
        let owned = self.store.list_owned_contacts(owner).await?;
        let reverse = self.store.list_reverse_contacts(owner).await?;
        if owned.is_empty() && reverse.is_empty() {
            return Ok(ContactList::default());
        }

        let added_me: HashSet<Uuid> = reverse.iter().map(|r| r.id).collect();
        let my_nicknames: HashMap<Uuid, Option<String>> =
            owned.iter().map(|c| (c.id, c.nickname.clone())).collect();

        let mut contacts = Vec::with_capacity(owned.len());
        for row in owned {
            let is_mutual = added_me.contains(&row.id);
            let nickname = row.nickname.clone();
            contacts.push(self.contact_view(row, nickname, is_mutual).await?);
        }

        let mut people_who_added_you = Vec::with_capacity(reverse.len());
        for row in reverse {
            let is_mutual = my_nicknames.contains_key(&row.id);
            let nickname = my_nicknames.get(&row.id).cloned().flatten();
            people_who_added_you.push(self.contact_view(row, nickname, is_mutual).await?);
        }

        Ok(ContactList {
            contacts,
            people_who_added_you,
        })
    }

    /// Inbound pending requests carry the viewer's own nickname for the
    /// requester; sent requests carry the nickname chosen when sending.
    #[instrument(skip(self), fields(owner_id = %owner))]
    pub async fn get_contact_requests(&self, owner: Uuid) -> Result<ContactRequestList, ContactError> {
        let my_nicknames: HashMap<Uuid, Option<String>> = self
            .store
            .list_owned_contacts(owner)
            .await?
            .into_iter()
            .map(|c| (c.id, c.nickname))
            .collect();

        let pending_rows = self.store.list_pending_requests_to(owner).await?;
        let sent_rows = self.store.list_requests_sent_by(owner).await?;

        let mut pending = Vec::with_capacity(pending_rows.len());
        for row in pending_rows {
            let nickname = my_nicknames.get(&row.id).cloned().flatten();
            pending.push(self.request_view(row, nickname).await?);
        }

        let mut sent = Vec::with_capacity(sent_rows.len());
        for row in sent_rows {
            let nickname = row.nickname.clone();
            sent.push(self.request_view(row, nickname).await?);
        }

        Ok(ContactRequestList { pending, sent })
    }

    async fn contact_view(
        &self,
        row: ContactRow,
        nickname: Option<String>,
        is_mutual: bool,
    ) -> Result<Contact, ContactError> {
        let username = self.username(&row.cipher_username)?;
        let avatar_url = self
            .gated_avatar_url(row.id, &row.avatar, row.visibility)
            .await?;
        Ok(Contact {
            id: row.id,
            name: row.name,
            username,
            bio: row.bio,
            nickname,
            created_at: row.created_at,
            updated_at: row.updated_at,
            avatar_url,
            is_mutual,
        })
    }

    async fn request_view(
        &self,
        row: ContactRequestRow,
        nickname: Option<String>,
    ) -> Result<ContactRequestEntry, ContactError> {
        let username = self.username(&row.cipher_username)?;
        let avatar_url = self
            .gated_avatar_url(row.id, &row.avatar, row.visibility)
            .await?;
        Ok(ContactRequestEntry {
            id: row.id,
            name: row.name,
            username,
            bio: row.bio,
            nickname,
            requested_at: row.created_at,
            updated_at: row.updated_at,
            status: row.status,
            avatar_url,
        })
    }

    fn username(&self, cipher_text: &str) -> Result<String, ContactError> {
        if cipher_text.is_empty() {
            return Ok(String::new());
        }
        Ok(self.cipher.decrypt(cipher_text)?)
    }

    async fn gated_avatar_url(
        &self,
        peer: Uuid,
        avatar: &AvatarColumns,
        visibility: AvatarVisibility,
    ) -> Result<Option<String>, ContactError> {
        if !visibility.exposes_avatar() {
            return Ok(None);
        }
        Ok(self.tokens.avatar_url(peer, avatar).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_trimmed_and_blank_is_absent() {
        assert_eq!(normalize_nickname(None).unwrap(), None);
        assert_eq!(normalize_nickname(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_nickname(Some("  Mum ")).unwrap().as_deref(),
            Some("Mum")
        );
    }

    #[test]
    fn nickname_length_counts_characters() {
        let forty = "é".repeat(40);
        assert_eq!(normalize_nickname(Some(&forty)).unwrap(), Some(forty.clone()));

        let forty_one = format!("{forty}x");
        assert!(matches!(
            normalize_nickname(Some(&forty_one)),
            Err(ContactError::BadRequest("invalid_nickname_length"))
        ));
    }
}
