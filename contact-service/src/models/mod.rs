//! Domain models for contact-service.

mod avatar;
mod contact;
mod outcome;
mod profile;
mod request;

pub use avatar::{AvatarColumns, AvatarToken, AvatarVisibility, FileRef, IssuedToken};
pub use contact::{Contact, ContactExistence, ContactList, ContactRow};
pub use outcome::{ContactOutcome, StatusOkay};
pub use profile::{
    BlockStatus, CoreProfile, NewProfile, PrivateProfile, ProfileRow, ProfileType, ProfileUpdate,
    UnknownProfileType,
};
pub use request::{
    ContactRequestEntry, ContactRequestList, ContactRequestRow, NewContactRequest,
    RequestResolution, RequestStatus, ResolveOutcome, UndoOutcome, UnknownRequestStatus,
};
