//! Time-bounded read tokens for avatar media.
//!
//! Per owner the token moves Absent → Issued → (valid | expiring) → Refreshed.
//! A token is never handed out with an expiry at or before "now"; stale tokens
//! are refreshed synchronously before the URL is built. Refreshes are not
//! serialized across callers: two requests may both refresh, the last write
//! wins and either token is acceptable. A refresh only rewrites the row for
//! the same media object, so an avatar removed or replaced meanwhile stays so.

use crate::models::{AvatarColumns, AvatarToken, FileRef, IssuedToken};
use crate::services::error::{IssuerError, StoreError, TokenError};
use crate::services::metrics::AVATAR_TOKEN_REFRESHES;
use crate::services::store::AvatarTokenStore;
use crate::services::token_issuer::MediaTokenIssuer;
use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Token parts needed for a URL a client can actually open (id and secret).
pub const FULL_TOKEN: usize = 2;

const TOKEN_VALIDITY_MONTHS: u32 = 12;

/// Builds `…/storage/buckets/{bucket}/files/{file}/view?project=…&token=…` URLs.
#[derive(Debug, Clone)]
pub struct AvatarUrlBuilder {
    endpoint: String,
    project_id: String,
    bucket_id: String,
}

impl AvatarUrlBuilder {
    pub fn new(endpoint: &str, project_id: &str, bucket_id: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            bucket_id: bucket_id.to_string(),
        }
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// `None` when there is no media object or fewer than `min_token_count`
    /// token parts are known. The last part is the secret used in the URL.
    pub fn resolve_url(&self, file_ref: Option<&FileRef>, min_token_count: usize) -> Option<String> {
        let file_ref = file_ref.filter(|f| !f.file_id.is_empty())?;
        if file_ref.token_parts.len() < min_token_count {
            return None;
        }

        let mut url = format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint, self.bucket_id, file_ref.file_id, self.project_id
        );
        if let Some(secret) = file_ref.token_parts.last() {
            url.push_str("&token=");
            url.push_str(secret);
        }
        Some(url)
    }
}

#[derive(Clone)]
pub struct AccessTokenCache {
    issuer: Arc<dyn MediaTokenIssuer>,
    store: Arc<dyn AvatarTokenStore>,
    urls: AvatarUrlBuilder,
    call_timeout: Duration,
}

impl AccessTokenCache {
    pub fn new(
        issuer: Arc<dyn MediaTokenIssuer>,
        store: Arc<dyn AvatarTokenStore>,
        urls: AvatarUrlBuilder,
        call_timeout: Duration,
    ) -> Self {
        Self {
            issuer,
            store,
            urls,
            call_timeout,
        }
    }

    pub fn resolve_url(&self, file_ref: Option<&FileRef>, min_token_count: usize) -> Option<String> {
        self.urls.resolve_url(file_ref, min_token_count)
    }

    /// Expiry for a token issued at `now`.
    pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_months(Months::new(TOKEN_VALIDITY_MONTHS))
            .unwrap_or_else(|| now + ChronoDuration::days(365))
    }

    pub async fn ensure_fresh(&self, token: AvatarToken) -> Result<AvatarToken, TokenError> {
        self.ensure_fresh_at(token, Utc::now()).await
    }

    /// Return `token` unchanged while it is valid at `now`; otherwise issue,
    /// persist and return a replacement. Not retried on failure. Fails with
    /// `NotFound` when the avatar was removed or replaced after `token` was read.
    #[instrument(skip(self, token), fields(owner_id = %token.owner_id, file_id = %token.file_id))]
    pub async fn ensure_fresh_at(
        &self,
        token: AvatarToken,
        now: DateTime<Utc>,
    ) -> Result<AvatarToken, TokenError> {
        if !token.needs_refresh(now, ChronoDuration::zero()) {
            return Ok(token);
        }

        let issued = self.issue(&token.file_id, now).await.map_err(|e| {
            let status = if matches!(e, IssuerError::Timeout) {
                "timeout"
            } else {
                "issue_failed"
            };
            AVATAR_TOKEN_REFRESHES.with_label_values(&[status]).inc();
            warn!(error = %e, "Avatar token issuance failed");
            TokenError::RefreshFailed(anyhow::Error::new(e))
        })?;

        let refreshed = token.with_issued(&issued);
        // A failure here orphans the issued token remotely; it expires on its own.
        let kept = self
            .bounded(self.store.refresh_avatar_token(&refreshed))
            .await
            .map_err(|e| {
                AVATAR_TOKEN_REFRESHES
                    .with_label_values(&["persist_failed"])
                    .inc();
                warn!(error = %e, token_id = %issued.id, "Avatar token issued but not persisted");
                TokenError::RefreshFailed(e)
            })?;

        if !kept {
            // Removed or replaced since the caller read it; never resurrect it.
            AVATAR_TOKEN_REFRESHES.with_label_values(&["gone"]).inc();
            info!("Avatar changed during refresh, dropping issued token");
            self.revoke_quietly(&issued.id).await;
            return Err(TokenError::NotFound);
        }

        AVATAR_TOKEN_REFRESHES.with_label_values(&["ok"]).inc();
        info!(expiry = %issued.expiry, "Avatar token refreshed");
        Ok(refreshed)
    }

    /// Fresh display URL for a peer's avatar columns, `None` when there is no
    /// avatar.
    pub async fn avatar_url(
        &self,
        owner_id: Uuid,
        columns: &AvatarColumns,
    ) -> Result<Option<String>, TokenError> {
        let Some(token) = columns.token(owner_id) else {
            return Ok(None);
        };
        match self.ensure_fresh(token).await {
            Ok(fresh) => Ok(self.resolve_url(Some(&fresh.file_ref()), FULL_TOKEN)),
            Err(TokenError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make a newly uploaded media object the owner's avatar. The previous
    /// avatar stays in place until the new row is written; its token is then
    /// revoked (best effort).
    #[instrument(skip(self))]
    pub async fn register(&self, owner_id: Uuid, file_id: &str) -> Result<AvatarToken, TokenError> {
        let previous = self.store.avatar_token(owner_id).await?;

        let now = Utc::now();
        let issued = self
            .issue(file_id, now)
            .await
            .map_err(|e| TokenError::RefreshFailed(anyhow::Error::new(e)))?;

        let token = AvatarToken {
            owner_id,
            file_id: file_id.to_string(),
            token_id: None,
            token_secret: None,
            expiry: None,
        }
        .with_issued(&issued);
        self.bounded(self.store.save_avatar_token(&token))
            .await
            .map_err(TokenError::RefreshFailed)?;

        if let Some(old_id) = previous
            .and_then(|p| p.token_id)
            .filter(|id| !id.is_empty() && *id != issued.id)
        {
            self.revoke_quietly(&old_id).await;
        }

        info!(owner_id = %owner_id, "Avatar token registered");
        Ok(token)
    }

    /// Revoke the remote token (best effort) and delete the stored row.
    #[instrument(skip(self))]
    pub async fn evict(&self, owner_id: Uuid) -> Result<AvatarToken, TokenError> {
        let token = self
            .store
            .avatar_token(owner_id)
            .await?
            .ok_or(TokenError::NotFound)?;

        if let Some(token_id) = token.token_id.as_deref().filter(|id| !id.is_empty()) {
            self.revoke_quietly(token_id).await;
        }

        if !self.store.delete_avatar_token(owner_id).await? {
            return Err(TokenError::NotFound);
        }
        info!(owner_id = %owner_id, "Avatar token evicted");
        Ok(token)
    }

    async fn issue(&self, file_id: &str, now: DateTime<Utc>) -> Result<IssuedToken, IssuerError> {
        let expiry = Self::expiry_from(now);
        tokio::time::timeout(
            self.call_timeout,
            self.issuer.issue(self.urls.bucket_id(), file_id, expiry),
        )
        .await
        .map_err(|_| IssuerError::Timeout)?
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> anyhow::Result<T> {
        let value = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| anyhow::anyhow!("timed out writing avatar token"))??;
        Ok(value)
    }

    async fn revoke_quietly(&self, token_id: &str) {
        match tokio::time::timeout(self.call_timeout, self.issuer.revoke(token_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, token_id, "Failed to revoke avatar token"),
            Err(_) => warn!(token_id, "Timed out revoking avatar token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{InMemoryStore, MockTokenIssuer};

    fn cache(issuer: Arc<MockTokenIssuer>, store: Arc<InMemoryStore>) -> AccessTokenCache {
        AccessTokenCache::new(
            issuer,
            store,
            AvatarUrlBuilder::new("https://media.test/v1/", "proj", "avatars"),
            Duration::from_secs(1),
        )
    }

    fn token(expiry: Option<DateTime<Utc>>) -> AvatarToken {
        AvatarToken {
            owner_id: Uuid::new_v4(),
            file_id: "file_1".into(),
            token_id: Some("old_id".into()),
            token_secret: Some("old_secret".into()),
            expiry,
        }
    }

    #[tokio::test]
    async fn expired_token_is_reissued_and_persisted() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let now = Utc::now();

        let stale = token(Some(now - ChronoDuration::seconds(1)));
        let owner = stale.owner_id;
        store.save_avatar_token(&stale).await.unwrap();
        let fresh = cache.ensure_fresh_at(stale, now).await.unwrap();

        assert_eq!(issuer.issued_count(), 1);
        assert_ne!(fresh.token_id.as_deref(), Some("old_id"));
        assert!(fresh.expiry.unwrap() > now);
        assert_eq!(store.avatar_token(owner).await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn valid_token_is_returned_unchanged() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let cache = cache(issuer.clone(), Arc::new(InMemoryStore::new()));
        let now = Utc::now();

        let valid = token(Some(AccessTokenCache::expiry_from(now)));
        let out = cache.ensure_fresh_at(valid.clone(), now).await.unwrap();

        assert_eq!(out, valid);
        assert_eq!(issuer.issued_count(), 0);
    }

    #[tokio::test]
    async fn missing_expiry_triggers_refresh() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let unset = token(None);
        store.save_avatar_token(&unset).await.unwrap();

        cache.ensure_fresh(unset).await.unwrap();
        assert_eq!(issuer.issued_count(), 1);
    }

    #[tokio::test]
    async fn refresh_does_not_resurrect_an_evicted_avatar() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let owner = Uuid::new_v4();

        let registered = cache.register(owner, "file_1").await.unwrap();
        cache.evict(owner).await.unwrap();

        // A reader that loaded the row before eviction now finds it stale.
        let later = Utc::now() + ChronoDuration::days(800);
        let err = cache.ensure_fresh_at(registered, later).await.unwrap_err();

        assert!(matches!(err, TokenError::NotFound));
        assert!(store.avatar_token(owner).await.unwrap().is_none());
        // The token minted for the refresh is handed back.
        assert_eq!(issuer.revoked(), vec!["tok_1".to_string(), "tok_2".to_string()]);
    }

    #[tokio::test]
    async fn refresh_does_not_overwrite_a_replaced_avatar() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let owner = Uuid::new_v4();

        let old = cache.register(owner, "file_1").await.unwrap();
        cache.register(owner, "file_2").await.unwrap();

        let later = Utc::now() + ChronoDuration::days(800);
        assert!(matches!(
            cache.ensure_fresh_at(old, later).await,
            Err(TokenError::NotFound)
        ));
        let stored = store.avatar_token(owner).await.unwrap().unwrap();
        assert_eq!(stored.file_id, "file_2");
        assert_eq!(stored.token_id.as_deref(), Some("tok_2"));
    }

    #[tokio::test]
    async fn vanished_avatar_reads_as_no_url() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let cache = cache(issuer, Arc::new(InMemoryStore::new()));
        let columns = AvatarColumns {
            avatar_file_id: Some("file_1".into()),
            ..Default::default()
        };

        let url = cache.avatar_url(Uuid::new_v4(), &columns).await.unwrap();
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_the_current_avatar() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let owner = Uuid::new_v4();

        let current = cache.register(owner, "old").await.unwrap();
        issuer.set_failing(true);

        assert!(matches!(
            cache.register(owner, "new").await,
            Err(TokenError::RefreshFailed(_))
        ));
        assert_eq!(store.avatar_token(owner).await.unwrap(), Some(current));
        assert!(issuer.revoked().is_empty());
    }

    #[tokio::test]
    async fn issuer_failure_is_refresh_failed() {
        let issuer = Arc::new(MockTokenIssuer::new());
        issuer.set_failing(true);
        let cache = cache(issuer, Arc::new(InMemoryStore::new()));
        let err = cache.ensure_fresh(token(None)).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn persistence_failure_is_refresh_failed() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let cache = cache(issuer.clone(), store);
        let err = cache.ensure_fresh(token(None)).await.unwrap_err();
        assert!(matches!(err, TokenError::RefreshFailed(_)));
        assert_eq!(issuer.issued_count(), 1);
    }

    #[test]
    fn url_requires_enough_token_parts() {
        let urls = AvatarUrlBuilder::new("https://media.test/v1/", "proj", "avatars");
        let full = FileRef {
            file_id: "f1".into(),
            token_parts: vec!["tid".into(), "sec".into()],
        };
        assert_eq!(
            urls.resolve_url(Some(&full), FULL_TOKEN).as_deref(),
            Some("https://media.test/v1/storage/buckets/avatars/files/f1/view?project=proj&token=sec")
        );

        let partial = FileRef {
            file_id: "f1".into(),
            token_parts: vec!["tid".into()],
        };
        assert!(urls.resolve_url(Some(&partial), FULL_TOKEN).is_none());
        assert!(urls.resolve_url(None, 0).is_none());
    }

    #[tokio::test]
    async fn no_file_means_no_url_and_no_issuance() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let cache = cache(issuer.clone(), Arc::new(InMemoryStore::new()));
        let url = cache
            .avatar_url(Uuid::new_v4(), &AvatarColumns::default())
            .await
            .unwrap();
        assert!(url.is_none());
        assert_eq!(issuer.issued_count(), 0);
    }

    #[tokio::test]
    async fn register_then_evict() {
        let issuer = Arc::new(MockTokenIssuer::new());
        let store = Arc::new(InMemoryStore::new());
        let cache = cache(issuer.clone(), store.clone());
        let owner = Uuid::new_v4();

        let token = cache.register(owner, "file_9").await.unwrap();
        assert!(token.expiry.unwrap() > Utc::now());
        assert!(store.avatar_token(owner).await.unwrap().is_some());

        cache.evict(owner).await.unwrap();
        assert!(store.avatar_token(owner).await.unwrap().is_none());
        assert_eq!(issuer.revoked(), vec![token.token_id.unwrap()]);
        assert!(matches!(cache.evict(owner).await, Err(TokenError::NotFound)));
    }
}
