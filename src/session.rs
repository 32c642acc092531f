use crate::auth::{Credential, CredentialManager};
use crate::calendar_api::CalendarClient;
use crate::config::{
    Config, Provider, CALENDAR_API_BASE_URL, DRIVE_API_BASE_URL, GMAIL_API_BASE_URL,
    NOTION_API_BASE_URL, NOTION_API_VERSION,
};
use crate::drive_api::DriveClient;
use crate::errors::{ApiResult, AuthError};
use crate::gmail_api::GmailClient;
use crate::notion_api::NotionClient;
use log::{debug, info};
use reqwest::{Client, Method, RequestBuilder};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// An authenticated handle to one provider.
///
/// The credential is re-checked before every request and renewed through the
/// manager when it has expired.
pub struct Session {
    provider: Provider,
    http: Client,
    credential: Mutex<Credential>,
    manager: Option<Arc<CredentialManager>>,
}

impl Session {
    /// Run the credential lifecycle and wrap the result.
    pub async fn open(manager: Arc<CredentialManager>) -> Result<Self, AuthError> {
        let credential = manager.obtain().await?;
        info!("{} session established", manager.provider());
        Ok(Self {
            provider: manager.provider(),
            http: Client::new(),
            credential: Mutex::new(credential),
            manager: Some(manager),
        })
    }

    /// A session over a fixed credential, with no way to renew it.
    pub fn from_credential(provider: Provider, credential: Credential) -> Self {
        Self {
            provider,
            http: Client::new(),
            credential: Mutex::new(credential),
            manager: None,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub async fn bearer_token(&self) -> ApiResult<String> {
        let mut credential = self.credential.lock().await;
        if !credential.is_valid() {
            let manager = self
                .manager
                .as_ref()
                .ok_or_else(|| AuthError::NotRefreshable(self.provider.to_string()))?;
            debug!("{} token expired mid-session, renewing", self.provider);
            *credential = manager.renew(&credential).await?;
        }
        Ok(credential.access_token.clone())
    }

    /// Start an authenticated request.
    pub async fn request(&self, method: Method, url: &str) -> ApiResult<RequestBuilder> {
        let token = self.bearer_token().await?;
        let builder = self.http.request(method, url).bearer_auth(token);
        Ok(match self.provider {
            Provider::Notion => builder.header("Notion-Version", NOTION_API_VERSION),
            _ => builder,
        })
    }
}

/// Lazily built, process-wide sessions, one per provider.
///
/// Each slot is initialized at most once even under concurrent tool calls.
pub struct SessionProvider {
    config: Config,
    slots: [OnceCell<Arc<Session>>; 4],
    base_urls: [String; 4],
}

impl SessionProvider {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slots: Default::default(),
            base_urls: [
                GMAIL_API_BASE_URL.to_string(),
                CALENDAR_API_BASE_URL.to_string(),
                DRIVE_API_BASE_URL.to_string(),
                NOTION_API_BASE_URL.to_string(),
            ],
        }
    }

    /// Pre-populate a provider's slot, bypassing the credential lifecycle.
    pub fn with_session(self, session: Session) -> Self {
        let index = session.provider().index();
        // A slot that is already set keeps its first session
        let _ = self.slots[index].set(Arc::new(session));
        self
    }

    pub fn with_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.base_urls[provider.index()] = url.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_initialized(&self, provider: Provider) -> bool {
        self.slots[provider.index()].initialized()
    }

    pub async fn session(&self, provider: Provider) -> ApiResult<Arc<Session>> {
        let session = self.slots[provider.index()]
            .get_or_try_init(|| async {
                debug!("Creating {} session", provider);
                let manager = Arc::new(CredentialManager::from_config(&self.config, provider));
                Session::open(manager).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(session))
    }

    fn base_url(&self, provider: Provider) -> &str {
        &self.base_urls[provider.index()]
    }

    pub async fn gmail(&self) -> ApiResult<GmailClient> {
        let session = self.session(Provider::Gmail).await?;
        Ok(GmailClient::new(session).with_base_url(self.base_url(Provider::Gmail)))
    }

    pub async fn calendar(&self) -> ApiResult<CalendarClient> {
        let session = self.session(Provider::Calendar).await?;
        Ok(CalendarClient::new(session).with_base_url(self.base_url(Provider::Calendar)))
    }

    pub async fn drive(&self) -> ApiResult<DriveClient> {
        let session = self.session(Provider::Drive).await?;
        Ok(DriveClient::new(session).with_base_url(self.base_url(Provider::Drive)))
    }

    pub async fn notion(&self) -> ApiResult<NotionClient> {
        let session = self.session(Provider::Notion).await?;
        Ok(NotionClient::new(session).with_base_url(self.base_url(Provider::Notion)))
    }
}
