//! Interactive OAuth consent.
//!
//! Opens the provider's consent page in a browser, waits for the redirect on
//! a one-shot loopback listener and exchanges the returned code for a
//! credential.

use crate::auth::{request_token, Credential, Grant};
use crate::config::{
    Provider, ProviderConfig, GOOGLE_AUTH_URL, NOTION_AUTH_URL, NOTION_TOKEN_URL, OAUTH_TOKEN_URL,
};
use crate::errors::{AuthError, AuthResult};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

const NOTION_CALLBACK_PATH: &str = "/auth/notion/callback";
const LISTENER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = concat!(
    "<html><body style=\"font-family: system-ui; text-align: center; padding: 40px;\">",
    "<h2>Authorization complete. You can close this tab.</h2></body></html>"
);
const DUPLICATE_PAGE: &str = concat!(
    "<html><body style=\"font-family: system-ui; text-align: center; padding: 40px;\">",
    "<h2>This authorization request was already handled.</h2></body></html>"
);

/// Application identity read from a provider's client-secret file.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uri: Option<String>,
}

#[derive(Deserialize)]
struct GoogleSecretFile {
    installed: Option<GoogleClientSection>,
    web: Option<GoogleClientSection>,
}

#[derive(Deserialize)]
struct GoogleClientSection {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct NotionSecretFile {
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    auth_url: Option<String>,
}

impl OAuthClient {
    /// Read the client-secret file for `provider`.
    ///
    /// A missing file is `MissingSecretFile`, which callers treat as fatal.
    pub fn load(provider: Provider, path: &Path) -> AuthResult<Self> {
        if !path.exists() {
            return Err(AuthError::MissingSecretFile {
                provider: provider.to_string(),
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let invalid = |reason: String| AuthError::InvalidSecretFile {
            path: path.to_path_buf(),
            reason,
        };

        if provider.is_google() {
            let file: GoogleSecretFile =
                serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
            let section = file.installed.or(file.web).ok_or_else(|| {
                invalid("expected an \"installed\" or \"web\" section".to_string())
            })?;
            Ok(OAuthClient {
                client_id: section.client_id,
                client_secret: section.client_secret,
                auth_uri: section.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
                token_uri: section.token_uri.unwrap_or_else(|| OAUTH_TOKEN_URL.to_string()),
                redirect_uri: section.redirect_uris.into_iter().next(),
            })
        } else {
            let file: NotionSecretFile =
                serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
            Ok(OAuthClient {
                client_id: file.client_id,
                client_secret: file.client_secret,
                auth_uri: file.auth_url.unwrap_or_else(|| NOTION_AUTH_URL.to_string()),
                token_uri: NOTION_TOKEN_URL.to_string(),
                redirect_uri: file.redirect_uri,
            })
        }
    }

    /// Redirect target for the loopback listener on `port`.
    ///
    /// Google desktop clients accept any localhost port, so the configured one
    /// wins. Notion redirect URIs are registered verbatim and used as-is, so a
    /// registered URI must point at the listener's loopback port.
    pub fn redirect_uri_for(&self, provider: Provider, port: u16) -> AuthResult<String> {
        match (provider, self.redirect_uri.as_deref()) {
            (Provider::Notion, Some(uri)) => {
                check_loopback_redirect(uri, port)?;
                Ok(uri.to_string())
            }
            (Provider::Notion, None) => {
                Ok(format!("http://localhost:{}{}", port, NOTION_CALLBACK_PATH))
            }
            _ => Ok(format!("http://localhost:{}/", port)),
        }
    }
}

fn check_loopback_redirect(uri: &str, port: u16) -> AuthResult<()> {
    let mismatch = |reason: String| AuthError::RedirectMismatch {
        redirect_uri: uri.to_string(),
        reason,
    };
    let url = Url::parse(uri).map_err(|e| mismatch(e.to_string()))?;
    match url.host_str() {
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") => {}
        other => {
            return Err(mismatch(format!(
                "host {} is not a loopback address",
                other.unwrap_or("<none>")
            )))
        }
    }
    match url.port_or_known_default() {
        Some(registered) if registered == port => Ok(()),
        registered => Err(mismatch(format!(
            "registered port {} differs from the callback port {}",
            registered.map_or_else(|| "<none>".to_string(), |p| p.to_string()),
            port
        ))),
    }
}

/// Build the consent URL, replacing any parameters the base URL already
/// carries.
pub fn build_authorization_url(
    provider: Provider,
    client: &OAuthClient,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> AuthResult<String> {
    let mut url = Url::parse(&client.auth_uri).map_err(|e| AuthError::InvalidSecretFile {
        path: Default::default(),
        reason: format!("invalid authorization URL {}: {}", client.auth_uri, e),
    })?;

    let mut params: Vec<(String, String)> = vec![
        ("client_id".into(), client.client_id.clone()),
        ("redirect_uri".into(), redirect_uri.to_string()),
        ("response_type".into(), "code".into()),
        ("state".into(), state.to_string()),
    ];
    if provider.is_google() {
        params.push(("scope".into(), scopes.join(" ")));
        params.push(("access_type".into(), "offline".into()));
        params.push(("prompt".into(), "consent".into()));
    } else {
        params.push(("owner".into(), "user".into()));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params);
    Ok(url.to_string())
}

pub fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub type ConsentFuture<'a> = Pin<Box<dyn Future<Output = AuthResult<Credential>> + Send + 'a>>;

/// The interactive step of the credential lifecycle.
pub trait ConsentFlow: Send + Sync {
    fn authorize<'a>(&'a self, config: &'a ProviderConfig, client: &'a OAuthClient)
        -> ConsentFuture<'a>;
}

/// Browser consent with a loopback redirect listener.
pub struct LocalServerConsent {
    timeout: Duration,
    http: Client,
    open_browser: bool,
    expiry_buffer_seconds: u64,
    state: Option<String>,
}

impl LocalServerConsent {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            http: Client::new(),
            open_browser: true,
            expiry_buffer_seconds: 60,
            state: None,
        }
    }

    /// Use a fixed CSRF state instead of a random one per flow.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_expiry_buffer(mut self, seconds: u64) -> Self {
        self.expiry_buffer_seconds = seconds;
        self
    }

    /// Only print the consent URL; used where no browser is available.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn run(&self, config: &ProviderConfig, client: &OAuthClient) -> AuthResult<Credential> {
        let provider = config.provider;
        let redirect_uri = client.redirect_uri_for(provider, config.callback_port)?;
        let callback_path = Url::parse(&redirect_uri)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());
        let state = self.state.clone().unwrap_or_else(random_state);
        let auth_url =
            build_authorization_url(provider, client, &redirect_uri, &config.scopes, &state)?;

        let listener = CallbackListener::bind(config.callback_port, &callback_path).await?;
        info!(
            "Waiting for {} authorization on 127.0.0.1:{}{}",
            provider, config.callback_port, callback_path
        );

        // stdout carries the MCP protocol, so the URL goes to stderr
        eprintln!("Open this URL to authorize {}:\n{}", provider, auth_url);
        if self.open_browser {
            if let Err(e) = webbrowser::open(&auth_url) {
                warn!("Failed to open browser: {}", e);
            }
        }

        let params = listener.wait(self.timeout).await?;

        if let Some(error) = params.get("error") {
            return Err(AuthError::ConsentFailed(format!(
                "{} returned error: {}",
                provider, error
            )));
        }
        if params.get("state").map(String::as_str) != Some(state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        let code = params.get("code").filter(|c| !c.is_empty()).ok_or_else(|| {
            AuthError::ConsentFailed("no authorization code in callback".to_string())
        })?;

        debug!("Exchanging {} authorization code", provider);
        let response = request_token(
            &self.http,
            provider,
            &client.token_uri,
            &client.client_id,
            client.client_secret.as_deref(),
            Grant::AuthorizationCode {
                code,
                redirect_uri: &redirect_uri,
            },
        )
        .await
        .map_err(AuthError::TokenExchange)?;

        Ok(Credential::from_token_response(
            response,
            &client.client_id,
            client.client_secret.as_deref(),
            &client.token_uri,
            &config.scopes,
            self.expiry_buffer_seconds,
        ))
    }
}

impl ConsentFlow for LocalServerConsent {
    fn authorize<'a>(
        &'a self,
        config: &'a ProviderConfig,
        client: &'a OAuthClient,
    ) -> ConsentFuture<'a> {
        Box::pin(self.run(config, client))
    }
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>;

/// One-shot redirect listener. Accepts the first callback, then is torn down.
struct CallbackListener {
    params_rx: oneshot::Receiver<HashMap<String, String>>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    async fn bind(port: u16, path: &str) -> AuthResult<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| {
                AuthError::ConsentFailed(format!("cannot listen on port {}: {}", port, e))
            })?;

        let (params_tx, params_rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(params_tx)));
        let app = Router::new()
            .route(path, get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!("Consent callback listener stopped with error: {}", e);
            }
        });

        Ok(Self {
            params_rx,
            shutdown_tx,
            task,
        })
    }

    async fn wait(self, timeout: Duration) -> AuthResult<HashMap<String, String>> {
        let Self {
            params_rx,
            shutdown_tx,
            mut task,
        } = self;

        let result = tokio::time::timeout(timeout, params_rx).await;

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(LISTENER_SHUTDOWN_GRACE, &mut task)
            .await
            .is_err()
        {
            task.abort();
        }
        debug!("Consent callback listener shut down");

        match result {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::ConsentFailed(
                "callback listener closed before a redirect arrived".to_string(),
            )),
            Err(_) => Err(AuthError::ConsentTimeout(timeout.as_secs())),
        }
    }
}

async fn handle_callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let sender = slot.lock().ok().and_then(|mut s| s.take());
    match sender {
        Some(tx) => {
            let _ = tx.send(params);
            Html(SUCCESS_PAGE)
        }
        None => Html(DUPLICATE_PAGE),
    }
}
