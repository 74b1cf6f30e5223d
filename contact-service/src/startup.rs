use crate::config::ContactConfig;
use crate::handlers::{self, contacts, profile};
use crate::services::{
    AccessTokenCache, AppwriteTokenIssuer, AvatarUrlBuilder, ContactService, Database,
    IdentityCipher, ProfileService,
};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub contacts: ContactService,
    pub profiles: ProfileService,
    /// Absent when running on the in-memory store.
    pub db: Option<Database>,
}

/// HTTP surface. Every request is bounded by `request_timeout`; on expiry the
/// handler future is dropped, cancelling any store or issuer call in flight.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let personal = Router::new()
        .route("/contacts/get", get(contacts::get_contacts))
        .route("/contacts/check-existence", post(contacts::check_existence))
        .route("/contacts/create", post(contacts::create_contact))
        .route("/contacts/delete", post(contacts::delete_contacts))
        .route("/contacts/requests/get", get(contacts::get_requests))
        .route("/contacts/requests/accept", post(contacts::accept_request))
        .route("/contacts/requests/reject", post(contacts::reject_request))
        .route("/contacts/requests/undo", post(contacts::undo_request))
        .route("/contacts/update-nickname", post(contacts::update_nickname))
        .route("/contacts/remove-nickname", post(contacts::remove_nickname))
        .route("/profile/create-profile", post(profile::create_profile))
        .route("/profile/get-profile", get(profile::get_profile))
        .route("/profile/update-profile", post(profile::update_profile))
        .route(
            "/profile/avatar",
            post(profile::attach_avatar).delete(profile::remove_avatar),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/personal", personal)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    app: Router,
}

impl Application {
    pub async fn build(config: ContactConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let cipher = IdentityCipher::new(config.username_keys.decode()?);

        let issuer = AppwriteTokenIssuer::new(&config.storage)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Token issuer: {}", e)))?;
        let store = Arc::new(db.clone());
        let tokens = AccessTokenCache::new(
            Arc::new(issuer),
            store.clone(),
            AvatarUrlBuilder::new(
                &config.storage.endpoint,
                &config.storage.project_id,
                &config.storage.avatar_bucket_id,
            ),
            config.storage.timeout(),
        );

        let state = AppState {
            contacts: ContactService::new(store.clone(), cipher.clone(), tokens.clone()),
            profiles: ProfileService::new(store, cipher, tokens),
            db: Some(db),
        };
        let app = router(state, config.common.request_timeout());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            app,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
