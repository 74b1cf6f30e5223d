//! Common test utilities for contact-service integration tests.
#![allow(dead_code)]

use contact_service::models::ProfileType;
use contact_service::services::{
    AccessTokenCache, AvatarUrlBuilder, ContactService, IdentityCipher, InMemoryStore,
    MockTokenIssuer, ProfileService, UsernameKeys,
};
use contact_service::startup::{router, AppState};
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,contact_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const MEDIA_ENDPOINT: &str = "https://media.test/v1";

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub issuer: Arc<MockTokenIssuer>,
    pub cipher: IdentityCipher,
    pub tokens: AccessTokenCache,
    pub contacts: ContactService,
    pub profiles: ProfileService,
}

/// A user created through the profile service.
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
}

pub fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    let issuer = Arc::new(MockTokenIssuer::new());
    let keys = UsernameKeys::new(vec![42u8; 32], b"test-lookup-key".to_vec())
        .expect("valid test keys");
    let cipher = IdentityCipher::new(keys);
    let tokens = AccessTokenCache::new(
        issuer.clone(),
        store.clone(),
        AvatarUrlBuilder::new(MEDIA_ENDPOINT, "proj", "avatars"),
        Duration::from_secs(2),
    );

    TestApp {
        contacts: ContactService::new(store.clone(), cipher.clone(), tokens.clone()),
        profiles: ProfileService::new(store.clone(), cipher.clone(), tokens.clone()),
        store,
        issuer,
        cipher,
        tokens,
    }
}

impl TestApp {
    pub async fn create_user(&self, name: &str, profile_type: ProfileType) -> TestUser {
        let id = Uuid::new_v4();
        let profile = self
            .profiles
            .create_profile(id, name, None, profile_type)
            .await
            .expect("Failed to create profile");
        TestUser {
            id,
            username: profile.username,
        }
    }

    pub fn router(&self) -> axum::Router {
        let state = AppState {
            contacts: self.contacts.clone(),
            profiles: self.profiles.clone(),
            db: None,
        };
        router(state, Duration::from_secs(5))
    }
}
