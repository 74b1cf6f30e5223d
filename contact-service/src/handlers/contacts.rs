use super::finish;
use crate::dtos::{
    CheckExistenceRequest, ContactTargetRequest, CreateContactRequest, DeleteContactRequest,
    UpdateNicknameRequest,
};
use crate::middleware::AuthUser;
use crate::models::{ContactExistence, ContactList, ContactRequestList, StatusOkay};
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{extract::State, Json};
use service_core::error::AppError;

pub async fn get_contacts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ContactList>, AppError> {
    let result = state.contacts.get_contacts(user.id).await;
    finish("get_contacts", result).map(Json)
}

pub async fn check_existence(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<CheckExistenceRequest>,
) -> Result<Json<ContactExistence>, AppError> {
    let result = state
        .contacts
        .check_contact_existence(user.id, &body.username)
        .await;
    finish("check_contact_existence", result).map(Json)
}

pub async fn create_contact(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<CreateContactRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let target = body.target()?;
        state
            .contacts
            .create_contact(user.id, target, body.nickname.as_deref())
            .await
    }
    .await;
    finish("create_contact", result).map(|o| Json(o.into()))
}

pub async fn delete_contacts(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<DeleteContactRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let targets = body.targets()?;
        state.contacts.delete_contacts(user.id, &targets).await
    }
    .await;
    finish("delete_contacts", result).map(|o| Json(o.into()))
}

pub async fn get_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ContactRequestList>, AppError> {
    let result = state.contacts.get_contact_requests(user.id).await;
    finish("get_contact_requests", result).map(Json)
}

pub async fn accept_request(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<ContactTargetRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let requester = body.target()?;
        state.contacts.accept_contact_request(user.id, requester).await
    }
    .await;
    finish("accept_contact_request", result).map(|o| Json(o.into()))
}

pub async fn reject_request(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<ContactTargetRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let requester = body.target()?;
        state.contacts.reject_contact_request(user.id, requester).await
    }
    .await;
    finish("reject_contact_request", result).map(|o| Json(o.into()))
}

pub async fn undo_request(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<ContactTargetRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let receiver = body.target()?;
        state.contacts.undo_contact_request(user.id, receiver).await
    }
    .await;
    finish("undo_contact_request", result).map(|o| Json(o.into()))
}

pub async fn update_nickname(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<UpdateNicknameRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let contact = body.target()?;
        state
            .contacts
            .update_contact_nickname(user.id, contact, body.nickname.as_deref())
            .await
    }
    .await;
    finish("update_contact_nickname", result).map(|o| Json(o.into()))
}

pub async fn remove_nickname(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<ContactTargetRequest>,
) -> Result<Json<StatusOkay>, AppError> {
    let result = async {
        let contact = body.target()?;
        state.contacts.remove_contact_nickname(user.id, contact).await
    }
    .await;
    finish("remove_contact_nickname", result).map(|o| Json(o.into()))
}
