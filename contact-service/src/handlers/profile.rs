use super::finish;
use crate::dtos::{AttachAvatarRequest, CreateProfileRequest, UpdateProfileRequest};
use crate::middleware::AuthUser;
use crate::models::{PrivateProfile, ProfileType, StatusOkay};
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

pub async fn create_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<CreateProfileRequest>,
) -> Result<(StatusCode, Json<PrivateProfile>), AppError> {
    let profile_type = body.profile_type.unwrap_or(ProfileType::Personal);
    let result = state
        .profiles
        .create_profile(user.id, &body.name, user.email, profile_type)
        .await;
    finish("create_profile", result).map(|p| (StatusCode::CREATED, Json(p)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PrivateProfile>, AppError> {
    let result = state.profiles.get_profile(user.id, user.email).await;
    finish("get_profile", result).map(Json)
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = state
        .profiles
        .update_profile(
            user.id,
            body.name.as_deref(),
            body.bio.as_deref(),
            body.profile_type,
        )
        .await;
    finish("update_profile", result).map(|o| Json(o.into()))
}

pub async fn attach_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<AttachAvatarRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = state
        .profiles
        .attach_avatar(user.id, body.file_id.trim())
        .await;
    finish("attach_avatar", result).map(|o| Json(o.into()))
}

pub async fn remove_avatar(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<StatusOkay>, AppError> {
    let result = state.profiles.remove_avatar(user.id).await;
    finish("remove_avatar", result).map(|o| Json(o.into()))
}
