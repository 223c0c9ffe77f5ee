//! Two-legged client-credentials authentication.

use std::fmt;
use std::sync::Arc;

use bucketmgr_protocol::{AccessToken, Scope};
use bucketmgr_transfer::{BoxFuture, TokenSource, TransferFailure};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{ApsClient, read_json};
use crate::ApsError;

const TOKEN_PATH: &str = "/authentication/v2/token";

/// Client id, secret and scopes, owned by whoever authenticates.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<Scope>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Scope::DEFAULT.to_vec(),
        }
    }

    /// Reads `APS_CLIENT_ID` and `APS_CLIENT_SECRET`.
    pub fn from_env() -> Option<Self> {
        let id = std::env::var("APS_CLIENT_ID").ok()?;
        let secret = std::env::var("APS_CLIENT_SECRET").ok()?;
        let credentials = Self::new(id, secret);
        credentials.is_complete().then_some(credentials)
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

impl ApsClient {
    /// Mints a token with the client-credentials grant.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken, ApsError> {
        if !credentials.is_complete() {
            return Err(ApsError::MissingCredentials("client id and secret are required"));
        }

        let scope = Scope::join(&credentials.scopes);
        let resp = self
            .http()
            .post(self.url(TOKEN_PATH))
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", scope.as_str())])
            .send()
            .await?;
        let token: TokenResponse = read_json(resp).await?;

        info!(expires_in = token.expires_in, "authenticated");
        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}

/// Caches a client-credentials token and mints a new one on demand.
pub struct ClientCredentialsSource {
    client: Arc<ApsClient>,
    credentials: Credentials,
    cached: Mutex<Option<AccessToken>>,
}

impl ClientCredentialsSource {
    pub fn new(client: Arc<ApsClient>, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached token, minting one if none is cached or it expired.
    pub async fn token(&self) -> Result<AccessToken, ApsError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.is_expired()
        {
            return Ok(token.clone());
        }
        let token = self.client.authenticate(&self.credentials).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Discards the cached token and mints a new one.
    pub async fn refresh_token(&self) -> Result<AccessToken, ApsError> {
        let mut cached = self.cached.lock().await;
        debug!("refreshing access token");
        let token = self.client.authenticate(&self.credentials).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl TokenSource for ClientCredentialsSource {
    fn refresh(&self) -> BoxFuture<'_, Result<String, TransferFailure>> {
        Box::pin(async move {
            self.refresh_token()
                .await
                .map(|token| token.value)
                .map_err(TransferFailure::from)
        })
    }
}
