use crate::config::{Config, Provider, ProviderConfig, NOTION_API_VERSION};
use crate::errors::{AuthError, AuthResult};
use crate::oauth::{ConsentFlow, LocalServerConsent, OAuthClient};
use crate::token_store::{FileTokenStore, TokenStore};
use crate::utils::truncate_secret;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// Upper bound on a server-reported token lifetime (ten years)
const MAX_TOKEN_LIFETIME_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// An OAuth credential for exactly one provider.
///
/// The client identity is kept alongside the tokens so a stored credential
/// can be refreshed without re-reading the application secret file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl Credential {
    /// A token with no expiry (Notion) stays valid until revoked.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.map_or(false, |expiry| Utc::now() >= expiry)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map_or(false, |token| !token.is_empty())
    }

    pub(crate) fn from_token_response(
        response: TokenResponse,
        client_id: &str,
        client_secret: Option<&str>,
        token_uri: &str,
        default_scopes: &[String],
        expiry_buffer_seconds: u64,
    ) -> Self {
        // Set expiry slightly before the real one so a request never races it
        let expiry = response.expires_in.and_then(|secs| {
            let secs = secs
                .saturating_sub(expiry_buffer_seconds)
                .min(MAX_TOKEN_LIFETIME_SECONDS);
            let lifetime = Duration::seconds(i64::try_from(secs).ok()?);
            Utc::now().checked_add_signed(lifetime)
        });
        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_scopes.to_vec());

        Credential {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry,
            scopes,
            client_id: client_id.to_string(),
            client_secret: client_secret.map(str::to_string),
            token_uri: token_uri.to_string(),
            workspace_name: response.workspace_name,
            workspace_id: response.workspace_id,
        }
    }
}

/// Where a stored credential sits in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NoToken,
    Valid,
    ExpiredRefreshable,
    ExpiredNonRefreshable,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::NoToken => "no_token",
            CredentialState::Valid => "valid",
            CredentialState::ExpiredRefreshable => "expired_refreshable",
            CredentialState::ExpiredNonRefreshable => "expired_non_refreshable",
        }
    }
}

pub fn classify(credential: Option<&Credential>) -> CredentialState {
    match credential {
        None => CredentialState::NoToken,
        Some(c) if c.is_valid() => CredentialState::Valid,
        Some(c) if c.can_refresh() => CredentialState::ExpiredRefreshable,
        Some(_) => CredentialState::ExpiredNonRefreshable,
    }
}

// Token endpoint response, shared by Google and Notion
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

pub(crate) enum Grant<'a> {
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken(&'a str),
}

/// POST a grant to a token endpoint.
///
/// Google takes a form body with the client credentials inline; Notion takes
/// JSON with HTTP basic auth and a version header.
pub(crate) async fn request_token(
    http: &Client,
    provider: Provider,
    token_uri: &str,
    client_id: &str,
    client_secret: Option<&str>,
    grant: Grant<'_>,
) -> Result<TokenResponse, String> {
    debug!("Requesting {} token from {}", provider, token_uri);
    debug!("Using client_id: {} (truncated)", truncate_secret(client_id));

    let request = if provider.is_google() {
        let mut params: Vec<(&str, &str)> = vec![("client_id", client_id)];
        if let Some(secret) = client_secret {
            params.push(("client_secret", secret));
        }
        match &grant {
            Grant::AuthorizationCode { code, redirect_uri } => {
                params.push(("grant_type", "authorization_code"));
                params.push(("code", code));
                params.push(("redirect_uri", redirect_uri));
            }
            Grant::RefreshToken(token) => {
                params.push(("grant_type", "refresh_token"));
                params.push(("refresh_token", token));
            }
        }
        http.post(token_uri).form(&params)
    } else {
        let body = match &grant {
            Grant::AuthorizationCode { code, redirect_uri } => serde_json::json!({
                "grant_type": "authorization_code",
                "code": code,
                "redirect_uri": redirect_uri,
            }),
            Grant::RefreshToken(token) => serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": token,
            }),
        };
        http.post(token_uri)
            .basic_auth(client_id, client_secret)
            .header("Notion-Version", NOTION_API_VERSION)
            .json(&body)
    };

    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    debug!("Token response status: {}", status);

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no response body>".to_string());
        error!("Token request failed. Status: {}, Error: {}", status, error_text);
        return Err(format!("Status: {}, Error: {}", status, error_text));
    }

    let response_text = response
        .text()
        .await
        .map_err(|e| format!("Failed to get token response: {}", e))?;

    serde_json::from_str::<TokenResponse>(&response_text).map_err(|e| {
        error!("Failed to parse token response: {}", e);
        format!("Failed to parse token response: {}", e)
    })
}

/// Owns one provider's credential: decides whether to reuse, refresh or
/// re-acquire it, and persists every newly issued token.
pub struct CredentialManager {
    config: ProviderConfig,
    store: Box<dyn TokenStore>,
    consent: Box<dyn ConsentFlow>,
    http: Client,
    expiry_buffer_seconds: u64,
}

impl CredentialManager {
    pub fn new(
        config: ProviderConfig,
        store: Box<dyn TokenStore>,
        consent: Box<dyn ConsentFlow>,
    ) -> Self {
        Self {
            config,
            store,
            consent,
            http: Client::new(),
            expiry_buffer_seconds: 60,
        }
    }

    /// File-backed store and browser consent, as configured.
    pub fn from_config(settings: &Config, provider: Provider) -> Self {
        let config = settings.provider(provider).clone();
        let store = FileTokenStore::new(&config.token_path)
            .with_passphrase(settings.encryption_key.clone());
        let consent = LocalServerConsent::new(settings.consent_timeout)
            .with_expiry_buffer(settings.expiry_buffer_seconds);
        Self::new(config, Box::new(store), Box::new(consent))
            .with_expiry_buffer(settings.expiry_buffer_seconds)
    }

    pub fn with_expiry_buffer(mut self, seconds: u64) -> Self {
        self.expiry_buffer_seconds = seconds;
        self
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Lifecycle state of whatever is currently persisted, without side effects.
    pub fn stored_state(&self) -> CredentialState {
        classify(self.store.load().as_ref())
    }

    /// Return a usable credential, refreshing or running the consent flow as
    /// needed.
    pub async fn obtain(&self) -> AuthResult<Credential> {
        let provider = self.config.provider;
        let loaded = self.store.load();
        let state = classify(loaded.as_ref());
        debug!("{} credential state: {}", provider, state.as_str());

        match (state, loaded) {
            (CredentialState::Valid, Some(credential)) => {
                debug!("Using stored {} token", provider);
                return Ok(credential);
            }
            (CredentialState::ExpiredRefreshable, Some(credential)) => {
                match self.refresh(&credential).await {
                    Ok(refreshed) => {
                        self.persist(&refreshed);
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        warn!(
                            "Refreshing {} token failed, falling back to consent: {}",
                            provider, e
                        );
                    }
                }
            }
            _ => {}
        }

        let credential = self.acquire_interactively().await?;
        self.persist(&credential);
        Ok(credential)
    }

    /// Exchange the refresh token for a new access token. Does not persist.
    pub async fn refresh(&self, credential: &Credential) -> AuthResult<Credential> {
        let provider = self.config.provider;
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::NotRefreshable(provider.to_string()))?;

        debug!("OAuth token for {} expired, refreshing", provider);
        debug!(
            "Using refresh_token starting with: {} (truncated)",
            truncate_secret(refresh_token)
        );

        let response = request_token(
            &self.http,
            provider,
            &credential.token_uri,
            &credential.client_id,
            credential.client_secret.as_deref(),
            Grant::RefreshToken(refresh_token),
        )
        .await
        .map_err(AuthError::RefreshFailed)?;

        let mut refreshed = Credential::from_token_response(
            response,
            &credential.client_id,
            credential.client_secret.as_deref(),
            &credential.token_uri,
            &credential.scopes,
            self.expiry_buffer_seconds,
        );
        // Google omits the refresh token on refresh responses
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = credential.refresh_token.clone();
        }
        if refreshed.workspace_name.is_none() {
            refreshed.workspace_name = credential.workspace_name.clone();
        }
        if refreshed.workspace_id.is_none() {
            refreshed.workspace_id = credential.workspace_id.clone();
        }

        info!("{} token refreshed", provider);
        debug!(
            "Token (truncated): {}",
            truncate_secret(&refreshed.access_token)
        );
        Ok(refreshed)
    }

    /// Replace a credential that went stale during the process lifetime.
    pub async fn renew(&self, credential: &Credential) -> AuthResult<Credential> {
        if credential.can_refresh() {
            match self.refresh(credential).await {
                Ok(refreshed) => {
                    self.persist(&refreshed);
                    return Ok(refreshed);
                }
                Err(e) => warn!(
                    "Refreshing {} token failed, falling back to consent: {}",
                    self.config.provider, e
                ),
            }
        }
        let credential = self.acquire_interactively().await?;
        self.persist(&credential);
        Ok(credential)
    }

    async fn acquire_interactively(&self) -> AuthResult<Credential> {
        let provider = self.config.provider;
        let client = OAuthClient::load(provider, &self.config.secret_path)?;
        info!(
            "Starting {} consent flow on port {}",
            provider, self.config.callback_port
        );
        let credential = self.consent.authorize(&self.config, &client).await?;
        info!("{} consent flow completed", provider);
        Ok(credential)
    }

    fn persist(&self, credential: &Credential) {
        match self.store.save(credential) {
            Ok(()) => debug!(
                "Saved {} credential to {}",
                self.config.provider,
                self.store.location()
            ),
            Err(e) => warn!(
                "Could not persist {} credential to {}, continuing in memory: {}",
                self.config.provider,
                self.store.location(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expiry,
            scopes: vec![],
            client_id: "client".to_string(),
            client_secret: None,
            token_uri: "http://localhost/token".to_string(),
            workspace_name: None,
            workspace_id: None,
        }
    }

    #[test]
    fn test_classify_states() {
        let future = Some(Utc::now() + Duration::hours(1));
        let past = Some(Utc::now() - Duration::hours(1));

        assert_eq!(classify(None), CredentialState::NoToken);
        assert_eq!(classify(Some(&credential(future, None))), CredentialState::Valid);
        assert_eq!(classify(Some(&credential(None, None))), CredentialState::Valid);
        assert_eq!(
            classify(Some(&credential(past, Some("refresh")))),
            CredentialState::ExpiredRefreshable
        );
        assert_eq!(
            classify(Some(&credential(past, Some("")))),
            CredentialState::ExpiredNonRefreshable
        );
    }

    #[test]
    fn test_empty_access_token_is_not_valid() {
        let mut c = credential(None, Some("refresh"));
        c.access_token.clear();
        assert!(!c.is_valid());
        assert_eq!(classify(Some(&c)), CredentialState::ExpiredRefreshable);
    }

    #[test]
    fn test_from_token_response_applies_buffer_and_scopes() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: Some("a b".to_string()),
            token_type: Some("Bearer".to_string()),
            workspace_name: None,
            workspace_id: None,
        };
        let c = Credential::from_token_response(response, "id", None, "uri", &[], 60);
        let remaining = c.expiry.unwrap() - Utc::now();
        assert!(remaining <= Duration::seconds(3540));
        assert!(remaining > Duration::seconds(3500));
        assert_eq!(c.scopes, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_from_token_response_caps_huge_lifetime() {
        let response = TokenResponse {
            access_token: "forever".to_string(),
            expires_in: Some(u64::MAX),
            refresh_token: None,
            scope: None,
            token_type: None,
            workspace_name: None,
            workspace_id: None,
        };
        let c = Credential::from_token_response(response, "id", None, "uri", &[], 60);
        let remaining = c.expiry.unwrap() - Utc::now();
        assert!(remaining <= Duration::seconds(MAX_TOKEN_LIFETIME_SECONDS as i64));
        assert!(remaining > Duration::days(3600));
        assert!(c.is_valid());
    }
}
