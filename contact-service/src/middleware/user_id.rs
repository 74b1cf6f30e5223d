use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Authenticated caller, as asserted by the upstream gateway.
///
/// The gateway terminates sessions and OTP verification and forwards the
/// verified identity in `X-User-ID` (and optionally `X-User-Email`).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))?;

        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        // Add to tracing span for observability
        tracing::Span::current().record("user_id", tracing::field::display(id));

        Ok(AuthUser { id, email })
    }
}
