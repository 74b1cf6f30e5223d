use crate::config::StorageConfig;
use crate::models::IssuedToken;
use crate::services::error::IssuerError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

/// Issues and revokes read tokens for stored media objects.
#[async_trait]
pub trait MediaTokenIssuer: Send + Sync {
    async fn issue(
        &self,
        bucket_id: &str,
        file_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<IssuedToken, IssuerError>;

    async fn revoke(&self, token_id: &str) -> Result<(), IssuerError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "$id")]
    id: String,
    secret: String,
    expire: Option<DateTime<Utc>>,
}

/// File-token client for an Appwrite-compatible storage API.
pub struct AppwriteTokenIssuer {
    client: Client,
    endpoint: String,
    project_id: String,
    api_key: Secret<String>,
}

impl AppwriteTokenIssuer {
    pub fn new(config: &StorageConfig) -> Result<Self, IssuerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        tracing::info!(
            endpoint = %config.endpoint,
            project_id = %config.project_id,
            "Media token issuer initialized"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", self.api_key.expose_secret())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, IssuerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IssuerError::Status {
        status: status.as_u16(),
        body,
    })
}

fn map_send_error(e: reqwest::Error) -> IssuerError {
    if e.is_timeout() {
        IssuerError::Timeout
    } else {
        IssuerError::Request(e)
    }
}

#[async_trait]
impl MediaTokenIssuer for AppwriteTokenIssuer {
    #[tracing::instrument(skip(self, expiry), fields(bucket_id = %bucket_id, file_id = %file_id))]
    async fn issue(
        &self,
        bucket_id: &str,
        file_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<IssuedToken, IssuerError> {
        let url = format!(
            "{}/tokens/buckets/{}/files/{}",
            self.endpoint, bucket_id, file_id
        );
        let body = serde_json::json!({
            "expire": expiry.to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IssuerError::MalformedResponse(e.to_string()))?;
        if token.id.is_empty() || token.secret.is_empty() {
            return Err(IssuerError::MalformedResponse(
                "token id or secret missing".to_string(),
            ));
        }

        Ok(IssuedToken {
            id: token.id,
            secret: token.secret,
            expiry: token.expire.unwrap_or(expiry),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn revoke(&self, token_id: &str) -> Result<(), IssuerError> {
        let url = format!("{}/tokens/{}", self.endpoint, token_id);
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(map_send_error)?;
        check_status(response).await?;
        Ok(())
    }
}
