pub mod contacts;
pub mod database;
pub mod error;
pub mod identity_cipher;
pub mod memory;
pub mod metrics;
pub mod profiles;
pub mod store;
pub mod token_cache;
pub mod token_issuer;

pub use contacts::ContactService;
pub use database::Database;
pub use error::{CipherError, ContactError, ForbiddenReason, IssuerError, StoreError, TokenError};
pub use identity_cipher::{IdentityCipher, SealedUsername, UnassignedUsername, UsernameKeys};
pub use memory::{InMemoryStore, MockTokenIssuer};
pub use metrics::{get_metrics, init_metrics};
pub use profiles::ProfileService;
pub use store::{AvatarTokenStore, ContactGraphStore, ProfileStore};
pub use token_cache::{AccessTokenCache, AvatarUrlBuilder};
pub use token_issuer::{AppwriteTokenIssuer, MediaTokenIssuer};
