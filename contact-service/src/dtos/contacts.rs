use crate::services::ContactError;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

fn parse_user_id(raw: &str) -> Result<Uuid, ContactError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ContactError::BadRequest("invalid_contact_user_id"))
}

/// Body for operations addressing a single other user.
#[derive(Debug, Deserialize, Validate)]
pub struct ContactTargetRequest {
    #[validate(length(min = 1, message = "contact_user_id is required"))]
    pub contact_user_id: String,
}

impl ContactTargetRequest {
    pub fn target(&self) -> Result<Uuid, ContactError> {
        parse_user_id(&self.contact_user_id)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContactRequest {
    #[validate(length(min = 1, message = "contact_user_id is required"))]
    pub contact_user_id: String,

    pub nickname: Option<String>,
}

impl CreateContactRequest {
    pub fn target(&self) -> Result<Uuid, ContactError> {
        parse_user_id(&self.contact_user_id)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeleteContactRequest {
    #[validate(length(max = 500, message = "at most 500 contact ids"))]
    pub contact_user_ids: Vec<String>,
}

impl DeleteContactRequest {
    /// Parse every id; a blank or malformed entry fails the whole request.
    pub fn targets(&self) -> Result<Vec<Uuid>, ContactError> {
        self.contact_user_ids
            .iter()
            .map(|raw| parse_user_id(raw))
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckExistenceRequest {
    #[validate(length(min = 1, max = 64, message = "username must be 1-64 characters"))]
    pub username: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateNicknameRequest {
    #[validate(length(min = 1, message = "contact_user_id is required"))]
    pub contact_user_id: String,

    pub nickname: Option<String>,
}

impl UpdateNicknameRequest {
    pub fn target(&self) -> Result<Uuid, ContactError> {
        parse_user_id(&self.contact_user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_trimmed_before_parsing() {
        let id = Uuid::new_v4();
        let req = ContactTargetRequest {
            contact_user_id: format!("  {id} "),
        };
        assert_eq!(req.target().unwrap(), id);
    }

    #[test]
    fn malformed_target_is_bad_request() {
        let req = CreateContactRequest {
            contact_user_id: "not-a-uuid".into(),
            nickname: None,
        };
        assert!(matches!(
            req.target(),
            Err(ContactError::BadRequest("invalid_contact_user_id"))
        ));
    }

    #[test]
    fn one_bad_id_rejects_the_delete_list() {
        let req = DeleteContactRequest {
            contact_user_ids: vec![Uuid::new_v4().to_string(), " ".into()],
        };
        assert!(req.targets().is_err());
    }

    #[test]
    fn empty_delete_list_passes_validation() {
        let req: DeleteContactRequest =
            serde_json::from_str(r#"{"contact_user_ids": []}"#).unwrap();
        assert!(req.validate().is_ok());
        assert!(req.targets().unwrap().is_empty());
    }

    #[test]
    fn oversized_delete_list_fails_validation() {
        let req = DeleteContactRequest {
            contact_user_ids: vec![Uuid::new_v4().to_string(); 501],
        };
        assert!(req.validate().is_err());
    }
}
