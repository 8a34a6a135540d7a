use crate::config::ServerConfig;
use crate::errors::{GatewayError, UpstreamCategory};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

const TOKEN_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Refresh this long before the reported expiry to avoid racing it.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// App-only (client credentials) token source with in-process caching.
pub struct AuthManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: RwLock<Option<CachedToken>>,
}

impl AuthManager {
    pub fn new(config: &ServerConfig, http: reqwest::Client) -> Self {
        let tenant = config.tenant_id.clone().unwrap_or_default();
        Self {
            http,
            token_url: format!("{}/{}/oauth2/v2.0/token", config.login_base_url, tenant),
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            cached: RwLock::new(None),
        }
    }

    pub async fn bearer_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cached.read().clone() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now() {
                return Ok(token.access_token);
            }
        }
        self.refresh().await
    }

    /// Drop the cached token and fetch a fresh one. Used for the single
    /// retry after Graph rejects a request with 401.
    pub async fn force_refresh(&self) -> Result<String, GatewayError> {
        self.cached.write().take();
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, GatewayError> {
        tracing::debug!("requesting graph access token");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", TOKEN_SCOPE),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(GatewayError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                category: UpstreamCategory::Auth,
                status: Some(status.as_u16()),
                message: format!("token request rejected: {}", truncate(&body, 300)),
            });
        }

        let token: TokenResponse = response.json().await.map_err(GatewayError::transport)?;
        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in.max(0)),
        };
        *self.cached.write() = Some(cached);
        Ok(token.access_token)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
