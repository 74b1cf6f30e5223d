//! Postgres store for contact-service.

use crate::models::{
    AvatarToken, BlockStatus, ContactRequestRow, ContactRow, CoreProfile, NewContactRequest,
    NewProfile, ProfileRow, ProfileUpdate, RequestResolution, RequestStatus, ResolveOutcome, UndoOutcome,
};
use crate::services::error::StoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    AvatarTokenStore, ContactGraphStore, ProfileStore, LOOKUP_HASH_CONFLICT, PROFILE_ID_CONFLICT,
};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Peer profile, avatar and privacy columns. `$1` is always the viewer.
const PEER_COLUMNS: &str = r#"
    u.id, u.name, u.cipher_username, u.bio,
    a.file_id AS avatar_file_id,
    a.token_id AS avatar_token_id,
    a.token_secret AS avatar_token_secret,
    a.token_expiry AS avatar_token_expiry,
    COALESCE(ps.restrict_profile, FALSE) AS global_restrict_profile,
    COALESCE(pe.allow_profile, FALSE) AS exception_global_profile,
    COALESCE(ps.restrict_avatar, FALSE) AS global_restrict_avatar,
    COALESCE(pe.allow_avatar, FALSE) AS exception_global_avatar,
    COALESCE(pr.restrict_profile, FALSE) AS user_restrict_profile,
    COALESCE(pr.restrict_avatar, FALSE) AS user_restrict_avatar
"#;

const PEER_JOINS: &str = r#"
    LEFT JOIN avatars a ON a.user_id = u.id
    LEFT JOIN user_privacy_settings ps ON ps.user_id = u.id
    LEFT JOIN user_privacy_exceptions pe ON pe.owner_user_id = u.id AND pe.viewer_user_id = $1
    LEFT JOIN user_privacy_restrictions pr ON pr.owner_user_id = u.id AND pr.viewer_user_id = $1
"#;

const PROFILE_COLUMNS: &str = r#"
    u.id, u.cipher_username, u.name, u.bio, u.profile_type, u.created_at, u.updated_at,
    a.file_id AS avatar_file_id,
    a.token_id AS avatar_token_id,
    a.token_secret AS avatar_token_secret,
    a.token_expiry AS avatar_token_expiry
"#;

fn decode_status(raw: String) -> Result<RequestStatus, StoreError> {
    RequestStatus::try_from(raw).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "contact-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn contact_rows(&self, operation: &str, sql: &str, user_id: Uuid) -> Result<Vec<ContactRow>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let rows = sqlx::query_as::<_, ContactRow>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        timer.observe_duration();
        Ok(rows)
    }

    async fn request_rows(&self, operation: &str, sql: &str, user_id: Uuid) -> Result<Vec<ContactRequestRow>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let rows = sqlx::query_as::<_, ContactRequestRow>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        timer.observe_duration();
        Ok(rows)
    }
}

// -------------------------------------------------------------------------
// Contact graph
// -------------------------------------------------------------------------

#[async_trait]
impl ContactGraphStore for Database {
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_owned_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT {PEER_COLUMNS}, c.nickname, c.created_at, c.updated_at
            FROM user_contacts c
            JOIN users u ON u.id = c.contact_user_id
            {PEER_JOINS}
            WHERE c.owner_user_id = $1
            ORDER BY c.created_at DESC
            "#
        );
        self.contact_rows("list_owned_contacts", &sql, owner_id).await
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_reverse_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT {PEER_COLUMNS}, NULL::VARCHAR AS nickname, c.created_at, c.updated_at
            FROM user_contacts c
            JOIN users u ON u.id = c.owner_user_id
            {PEER_JOINS}
            WHERE c.contact_user_id = $1
            ORDER BY c.created_at DESC
            "#
        );
        self.contact_rows("list_reverse_contacts", &sql, owner_id).await
    }

    #[instrument(skip(self, lookup_hash))]
    async fn find_by_lookup_hash(&self, lookup_hash: &str) -> Result<Option<CoreProfile>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_lookup_hash"])
            .start_timer();
        let profile = sqlx::query_as::<_, CoreProfile>(
            "SELECT id, profile_type, is_admin_blocked FROM users WHERE lookup_hash = $1",
        )
        .bind(lookup_hash)
        .fetch_optional(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(profile)
    }

    #[instrument(skip(self))]
    async fn core_profile(&self, user_id: Uuid) -> Result<Option<CoreProfile>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["core_profile"])
            .start_timer();
        let profile = sqlx::query_as::<_, CoreProfile>(
            "SELECT id, profile_type, is_admin_blocked FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(profile)
    }

    #[instrument(skip(self))]
    async fn block_status(&self, viewer_id: Uuid, other_id: Uuid) -> Result<BlockStatus, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["block_status"])
            .start_timer();
        let code = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT CASE
                WHEN EXISTS (SELECT 1 FROM user_blocks WHERE blocker_user_id = $1 AND blocked_user_id = $2) THEN 1
                WHEN EXISTS (SELECT 1 FROM user_blocks WHERE blocker_user_id = $2 AND blocked_user_id = $1) THEN 2
                ELSE 0
            END
            "#,
        )
        .bind(viewer_id)
        .bind(other_id)
        .fetch_one(&self.pool)
        .await?;
        timer.observe_duration();

        BlockStatus::from_code(code).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Protocol(format!("unexpected block status {code}")))
        })
    }

    #[instrument(skip(self))]
    async fn contact_exists(&self, owner_id: Uuid, contact_id: Uuid) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["contact_exists"])
            .start_timer();
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM user_contacts WHERE owner_user_id = $1 AND contact_user_id = $2)",
        )
        .bind(owner_id)
        .bind(contact_id)
        .fetch_one(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self, nickname))]
    async fn insert_contact(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_contact"])
            .start_timer();
        sqlx::query(
            r#"
            INSERT INTO user_contacts (owner_user_id, contact_user_id, nickname)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_user_id, contact_user_id) DO NOTHING
            "#,
        )
        .bind(owner_id)
        .bind(contact_id)
        .bind(nickname)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, contact_ids), fields(owner_id = %owner_id, count = contact_ids.len()))]
    async fn delete_contacts(&self, owner_id: Uuid, contact_ids: &[Uuid]) -> Result<u64, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_contacts"])
            .start_timer();
        let result = sqlx::query(
            "DELETE FROM user_contacts WHERE owner_user_id = $1 AND contact_user_id = ANY($2)",
        )
        .bind(owner_id)
        .bind(contact_ids)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, nickname))]
    async fn update_nickname(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        nickname: Option<&str>,
    ) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_nickname"])
            .start_timer();
        let result = sqlx::query(
            r#"
            UPDATE user_contacts SET nickname = $3, updated_at = NOW()
            WHERE owner_user_id = $1 AND contact_user_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(contact_id)
        .bind(nickname)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn request_status(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<RequestStatus>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["request_status"])
            .start_timer();
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM contact_requests WHERE requester_user_id = $1 AND receiver_user_id = $2",
        )
        .bind(requester_id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.observe_duration();
        status.map(decode_status).transpose()
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_request(&self, request: &NewContactRequest) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_request"])
            .start_timer();
        let result = sqlx::query(
            r#"
            INSERT INTO contact_requests (id, requester_user_id, receiver_user_id, status, nickname)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (requester_user_id, receiver_user_id) DO NOTHING
            "#,
        )
        .bind(request.id)
        .bind(request.requester_id)
        .bind(request.receiver_id)
        .bind(&request.nickname)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(result.rows_affected() == 1)
    }

    /// Delete a resolved row and insert the new pending one in one transaction.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn replace_request(&self, request: &NewContactRequest) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_request"])
            .start_timer();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM contact_requests
            WHERE requester_user_id = $1 AND receiver_user_id = $2 AND status <> 'pending'
            "#,
        )
        .bind(request.requester_id)
        .bind(request.receiver_id)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO contact_requests (id, requester_user_id, receiver_user_id, status, nickname)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (requester_user_id, receiver_user_id) DO NOTHING
            "#,
        )
        .bind(request.id)
        .bind(request.requester_id)
        .bind(request.receiver_id)
        .bind(&request.nickname)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        tx.commit().await?;
        timer.observe_duration();
        Ok(inserted)
    }

    /// Lock the row, then update it only while it is still pending.
    #[instrument(skip(self))]
    async fn resolve_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
        resolution: RequestResolution,
    ) -> Result<ResolveOutcome, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_request"])
            .start_timer();
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, String>(
            r#"
            SELECT status FROM contact_requests
            WHERE requester_user_id = $1 AND receiver_user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(requester_id)
        .bind(receiver_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match current.map(decode_status).transpose()? {
            None => ResolveOutcome::NotFound,
            Some(status) if !status.is_pending() => ResolveOutcome::AlreadyResolved,
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE contact_requests SET status = $3, updated_at = NOW()
                    WHERE requester_user_id = $1 AND receiver_user_id = $2 AND status = 'pending'
                    "#,
                )
                .bind(requester_id)
                .bind(receiver_id)
                .bind(resolution.status().as_str())
                .execute(&mut *tx)
                .await?;
                ResolveOutcome::Resolved
            }
        };

        tx.commit().await?;
        timer.observe_duration();
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn delete_request(
        &self,
        requester_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<UndoOutcome, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_request"])
            .start_timer();
        let result = sqlx::query(
            r#"
            DELETE FROM contact_requests
            WHERE requester_user_id = $1 AND receiver_user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(requester_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();

        Ok(if result.rows_affected() == 1 {
            UndoOutcome::Undone
        } else {
            UndoOutcome::NotFound
        })
    }

    #[instrument(skip(self))]
    async fn list_pending_requests_to(&self, user_id: Uuid) -> Result<Vec<ContactRequestRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT {PEER_COLUMNS}, NULL::VARCHAR AS nickname, r.status, r.created_at, r.updated_at
            FROM contact_requests r
            JOIN users u ON u.id = r.requester_user_id
            {PEER_JOINS}
            WHERE r.receiver_user_id = $1 AND r.status = 'pending'
            ORDER BY r.created_at DESC
            "#
        );
        self.request_rows("list_pending_requests_to", &sql, user_id).await
    }

    #[instrument(skip(self))]
    async fn list_requests_sent_by(&self, user_id: Uuid) -> Result<Vec<ContactRequestRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT {PEER_COLUMNS}, r.nickname, r.status, r.created_at, r.updated_at
            FROM contact_requests r
            JOIN users u ON u.id = r.receiver_user_id
            {PEER_JOINS}
            WHERE r.requester_user_id = $1
            ORDER BY r.created_at DESC
            "#
        );
        self.request_rows("list_requests_sent_by", &sql, user_id).await
    }
}

// -------------------------------------------------------------------------
// Avatar tokens
// -------------------------------------------------------------------------

#[async_trait]
impl AvatarTokenStore for Database {
    #[instrument(skip(self))]
    async fn avatar_token(&self, owner_id: Uuid) -> Result<Option<AvatarToken>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["avatar_token"])
            .start_timer();
        let token = sqlx::query_as::<_, AvatarToken>(
            r#"
            SELECT user_id AS owner_id, file_id, token_id, token_secret, token_expiry AS expiry
            FROM avatars WHERE user_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(token)
    }

    #[instrument(skip(self, token), fields(owner_id = %token.owner_id))]
    async fn save_avatar_token(&self, token: &AvatarToken) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_avatar_token"])
            .start_timer();
        sqlx::query(
            r#"
            INSERT INTO avatars (user_id, file_id, token_id, token_secret, token_expiry)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                file_id = EXCLUDED.file_id,
                token_id = EXCLUDED.token_id,
                token_secret = EXCLUDED.token_secret,
                token_expiry = EXCLUDED.token_expiry,
                updated_at = NOW()
            "#,
        )
        .bind(token.owner_id)
        .bind(&token.file_id)
        .bind(&token.token_id)
        .bind(&token.token_secret)
        .bind(token.expiry)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, token), fields(owner_id = %token.owner_id, file_id = %token.file_id))]
    async fn refresh_avatar_token(&self, token: &AvatarToken) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["refresh_avatar_token"])
            .start_timer();
        let result = sqlx::query(
            r#"
            UPDATE avatars
            SET token_id = $3, token_secret = $4, token_expiry = $5, updated_at = NOW()
            WHERE user_id = $1 AND file_id = $2
            "#,
        )
        .bind(token.owner_id)
        .bind(&token.file_id)
        .bind(&token.token_id)
        .bind(&token.token_secret)
        .bind(token.expiry)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_avatar_token(&self, owner_id: Uuid) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_avatar_token"])
            .start_timer();
        let result = sqlx::query("DELETE FROM avatars WHERE user_id = $1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }
}

// -------------------------------------------------------------------------
// Profiles
// -------------------------------------------------------------------------

#[async_trait]
impl ProfileStore for Database {
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn insert_profile(&self, profile: &NewProfile) -> Result<ProfileRow, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_profile"])
            .start_timer();
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            INSERT INTO users (id, lookup_hash, cipher_username, name, profile_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, cipher_username, name, bio, profile_type, created_at, updated_at,
                NULL::TEXT AS avatar_file_id,
                NULL::TEXT AS avatar_token_id,
                NULL::TEXT AS avatar_token_secret,
                NULL::TIMESTAMPTZ AS avatar_token_expiry
            "#,
        )
        .bind(profile.id)
        .bind(&profile.lookup_hash)
        .bind(&profile.cipher_text)
        .bind(&profile.name)
        .bind(profile.profile_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                if db_err.constraint() == Some("users_lookup_hash_key") {
                    StoreError::Conflict(LOOKUP_HASH_CONFLICT.to_string())
                } else {
                    StoreError::Conflict(PROFILE_ID_CONFLICT.to_string())
                }
            }
            _ => StoreError::Database(e),
        })?;
        timer.observe_duration();

        info!(user_id = %row.id, "Profile inserted");
        Ok(row)
    }

    #[instrument(skip(self, lookup_hash))]
    async fn lookup_hash_exists(&self, lookup_hash: &str) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lookup_hash_exists"])
            .start_timer();
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lookup_hash = $1)",
        )
        .bind(lookup_hash)
        .fetch_one(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn profile(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["profile"])
            .start_timer();
        let sql = format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM users u
            LEFT JOIN avatars a ON a.user_id = u.id
            WHERE u.id = $1
            "#
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        timer.observe_duration();
        Ok(row)
    }

    #[instrument(skip(self, update))]
    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<bool, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_profile"])
            .start_timer();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                bio = CASE WHEN $3 THEN $4 ELSE bio END,
                profile_type = COALESCE($5, profile_type),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.name.as_deref())
        .bind(update.bio.is_some())
        .bind(update.bio.clone().flatten())
        .bind(update.profile_type.map(|t| t.as_str()))
        .execute(&self.pool)
        .await?;
        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }
}
