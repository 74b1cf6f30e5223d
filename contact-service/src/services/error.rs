use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("invalid owner id")]
    InvalidOwnerId,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("hash computation failed")]
    HashFailed,
}

#[derive(Error, Debug)]
pub enum IssuerError {
    #[error("token issuer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token issuer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token issuer timed out")]
    Timeout,

    #[error("malformed token issuer response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum TokenError {
    /// Issuance, persistence or a timeout while refreshing; never retried here.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] anyhow::Error),

    #[error("avatar token not found")]
    NotFound,

    #[error("avatar token store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    SelfAdminBlocked,
    UserAdminBlocked,
    YouBlockedUser,
    UserBlockedYou,
    UserPrivateProfile,
}

impl ForbiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfAdminBlocked => "self_admin_blocked",
            Self::UserAdminBlocked => "user_admin_blocked",
            Self::YouBlockedUser => "you_blocked_user",
            Self::UserBlockedYou => "user_blocked_you",
            Self::UserPrivateProfile => "user_private_profile",
        }
    }
}

impl std::fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("self_action_not_allowed")]
    SelfAction,

    #[error("{0}")]
    Forbidden(ForbiddenReason),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ContactError {
    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::SelfAction => "self_action",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for ContactError {
    fn from(err: StoreError) -> Self {
        ContactError::Internal(anyhow::Error::new(err).context("contact store"))
    }
}

impl From<CipherError> for ContactError {
    fn from(err: CipherError) -> Self {
        ContactError::Internal(anyhow::Error::new(err).context("identity cipher"))
    }
}

impl From<TokenError> for ContactError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotFound => ContactError::NotFound("avatar_not_found"),
            other => ContactError::Internal(anyhow::Error::new(other).context("avatar token")),
        }
    }
}

impl From<ContactError> for AppError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ContactError::SelfAction => {
                AppError::Conflict(anyhow::anyhow!("self_action_not_allowed"))
            }
            ContactError::Forbidden(reason) => AppError::Forbidden(anyhow::anyhow!(reason.as_str())),
            ContactError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ContactError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ContactError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn contact_errors_map_to_http_statuses() {
        let cases = [
            (ContactError::BadRequest("invalid_contact_user_id"), StatusCode::BAD_REQUEST),
            (ContactError::SelfAction, StatusCode::CONFLICT),
            (
                ContactError::Forbidden(ForbiddenReason::UserBlockedYou),
                StatusCode::FORBIDDEN,
            ),
            (ContactError::NotFound("user_not_found"), StatusCode::NOT_FOUND),
            (ContactError::Conflict("request_already_processed"), StatusCode::CONFLICT),
            (
                ContactError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn forbidden_carries_reason_code() {
        let err = ContactError::Forbidden(ForbiddenReason::UserPrivateProfile);
        assert_eq!(err.to_string(), "user_private_profile");
    }

    #[test]
    fn store_failures_become_internal() {
        let err: ContactError = StoreError::Unavailable("pool closed".into()).into();
        match err {
            ContactError::Internal(e) => assert!(format!("{:#}", e).contains("pool closed")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
