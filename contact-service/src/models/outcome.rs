//! Success outcomes of contact and profile mutations.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    AlreadyInContacts,
    PublicContactAdded,
    PendingRequestExists,
    ContactRequestSent,
    ContactRequestAccepted,
    ContactRequestDeclined,
    ContactRequestUndone,
    ContactDeleted,
    ContactsDeleted,
    ContactsDeletedPartial { removed: u64, requested: usize },
    NicknameUpdated,
    NicknameRemoved,
    AvatarUploaded,
    AvatarRemoved,
    ProfileUpdated,
}

impl ContactOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyInContacts => "already_in_contacts",
            Self::PublicContactAdded => "public_contact_added",
            Self::PendingRequestExists => "pending_request_exists",
            Self::ContactRequestSent => "contact_request_sent",
            Self::ContactRequestAccepted => "contact_request_accepted",
            Self::ContactRequestDeclined => "contact_request_declined",
            Self::ContactRequestUndone => "contact_request_undone",
            Self::ContactDeleted => "contact_deleted",
            Self::ContactsDeleted => "contacts_deleted",
            Self::ContactsDeletedPartial { .. } => "contacts_deleted_partial",
            Self::NicknameUpdated => "contact_nickname_updated",
            Self::NicknameRemoved => "contact_nickname_removed",
            Self::AvatarUploaded => "avatar_uploaded",
            Self::AvatarRemoved => "avatar_removed",
            Self::ProfileUpdated => "profile_updated",
        }
    }
}

impl std::fmt::Display for ContactOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response body for successful mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOkay {
    pub status: bool,
    pub message: String,
}

impl From<ContactOutcome> for StatusOkay {
    fn from(outcome: ContactOutcome) -> Self {
        Self {
            status: true,
            message: outcome.as_str().to_string(),
        }
    }
}
