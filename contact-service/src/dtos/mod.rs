pub mod contacts;
pub mod profile;

pub use contacts::{
    CheckExistenceRequest, ContactTargetRequest, CreateContactRequest, DeleteContactRequest,
    UpdateNicknameRequest,
};
pub use profile::{AttachAvatarRequest, CreateProfileRequest, UpdateProfileRequest};
