use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Default location of the cached credential blob.
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Token endpoint request timeout.
const TOKEN_TIMEOUT_SECS: u64 = 30;

/// Client identity plus the fixed endpoints of the authorization service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
}

impl CredentialConfig {
    /// Config with the service's standard endpoints baked in.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: REDIRECT_URI.to_string(),
            auth_uri: AUTH_URI.to_string(),
            token_uri: TOKEN_URI.to_string(),
        }
    }
}

/// A bearer credential for the upload service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// A credential is only usable while its expiry lies in the future.
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Persists one credential as a JSON blob at a fixed local path.
/// Knows nothing about how credentials are minted.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the cached credential. A missing file means "nothing cached";
    /// a corrupt blob is treated the same way after a warning, so the caller
    /// falls through to a fresh authorization instead of failing hard.
    pub async fn load(&self) -> Result<Option<Credential>, AuthError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::Store(e.to_string())),
        };

        match serde_json::from_str(&raw) {
            Ok(credential) => {
                debug!("📋 Loaded cached credential from {}", self.path.display());
                Ok(Some(credential))
            }
            Err(e) => {
                warn!(
                    "corrupt credential blob at {}, ignoring: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persist a credential. Written via a temp file and rename so a reader
    /// never observes a half-written blob.
    pub async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let raw = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        debug!("💾 Credential persisted to {}", self.path.display());
        Ok(())
    }
}

/// The interactive consent step: opens a browser, runs the redirect dance,
/// and yields a credential. Opaque to this crate; injected so the pipeline
/// can be driven without a human.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(&self, config: &CredentialConfig) -> Result<Credential, AuthError>;
}

/// Owns the lifecycle of one credential: load, validate, refresh, or fall
/// back to interactive consent, persisting after every mint or refresh.
pub struct CredentialManager {
    store: CredentialStore,
    consent: Arc<dyn ConsentFlow>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

impl CredentialManager {
    pub fn new(store: CredentialStore, consent: Arc<dyn ConsentFlow>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            store,
            consent,
            client,
        }
    }

    /// Produce a credential that is valid right now.
    ///
    /// A cached, unexpired credential is returned without any network
    /// traffic. An expired one gets exactly one refresh attempt; if that
    /// fails, or nothing is cached, the interactive consent flow runs.
    /// Every newly minted or refreshed credential is persisted before it is
    /// handed out.
    pub async fn get_valid_credential(
        &self,
        config: &CredentialConfig,
    ) -> Result<Credential, AuthError> {
        if let Some(cached) = self.store.load().await? {
            if cached.is_valid() {
                debug!("🔑 Cached credential still valid");
                return Ok(cached);
            }

            if let Some(refresh_token) = cached.refresh_token.clone() {
                match self.refresh(config, &refresh_token).await {
                    Ok(mut fresh) => {
                        // The token endpoint may omit the refresh token on
                        // renewal; keep the one we already hold.
                        if fresh.refresh_token.is_none() {
                            fresh.refresh_token = Some(refresh_token);
                        }
                        self.store.save(&fresh).await?;
                        info!("🔄 Credential refreshed");
                        return Ok(fresh);
                    }
                    Err(e) => {
                        warn!("token refresh failed, falling back to consent: {}", e);
                    }
                }
            }
        }

        let credential = self.consent.authorize(config).await?;
        self.store.save(&credential).await?;
        info!("🔑 New credential minted via interactive consent");
        Ok(credential)
    }

    async fn refresh(
        &self,
        config: &CredentialConfig,
        refresh_token: &str,
    ) -> Result<Credential, AuthError> {
        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&config.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Refresh(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Refresh(format!("unparseable token response: {e}")))?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}
