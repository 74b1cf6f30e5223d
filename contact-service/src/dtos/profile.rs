use crate::models::ProfileType;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    /// Defaults to `personal`.
    pub profile_type: Option<ProfileType>,
}

/// Only the provided fields change.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 40, message = "name must be 1-40 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 150, message = "bio must be at most 150 characters"))]
    pub bio: Option<String>,

    pub profile_type: Option<ProfileType>,
}

/// File id handed over by the upload layer once the avatar is stored.
#[derive(Debug, Deserialize, Validate)]
pub struct AttachAvatarRequest {
    #[validate(length(min = 1, max = 64, message = "file_id must be 1-64 characters"))]
    pub file_id: String,
}
