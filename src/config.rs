use crate::errors::ConfigError;
use dotenv::dotenv;
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// API URL constants
pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
pub const CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
pub const NOTION_API_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_API_VERSION: &str = "2022-06-28";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const NOTION_AUTH_URL: &str = "https://api.notion.com/v1/oauth/authorize";
pub const NOTION_TOKEN_URL: &str = "https://api.notion.com/v1/oauth/token";

const DEFAULT_CONSENT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_EXPIRY_BUFFER_SECONDS: u64 = 60;

/// The external systems this server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Calendar,
    Drive,
    Notion,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Gmail,
        Provider::Calendar,
        Provider::Drive,
        Provider::Notion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Calendar => "calendar",
            Provider::Drive => "drive",
            Provider::Notion => "notion",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Provider::Gmail => 0,
            Provider::Calendar => 1,
            Provider::Drive => 2,
            Provider::Notion => 3,
        }
    }

    pub fn is_google(&self) -> bool {
        !matches!(self, Provider::Notion)
    }

    pub fn scopes(&self) -> &'static [&'static str] {
        match self {
            Provider::Gmail => &["https://www.googleapis.com/auth/gmail.readonly"],
            Provider::Calendar => &[
                "https://www.googleapis.com/auth/calendar",
                "https://www.googleapis.com/auth/calendar.events",
            ],
            Provider::Drive => &[
                "https://www.googleapis.com/auth/drive.readonly",
                "https://www.googleapis.com/auth/drive.metadata.readonly",
            ],
            Provider::Notion => &[],
        }
    }

    pub fn default_callback_port(&self) -> u16 {
        match self {
            Provider::Gmail => 8080,
            Provider::Calendar => 8081,
            Provider::Notion => 8082,
            Provider::Drive => 8083,
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Provider::Gmail => "GMAIL",
            Provider::Calendar => "CALENDAR",
            Provider::Drive => "DRIVE",
            Provider::Notion => "NOTION",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidValue {
                var: "provider".to_string(),
                value: s.to_string(),
            })
    }
}

/// Where one provider keeps its application secret and token, and which
/// loopback port its consent flow listens on.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub secret_path: PathBuf,
    pub token_path: PathBuf,
    pub callback_port: u16,
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    pub fn new(provider: Provider, secret_path: PathBuf, token_path: PathBuf, port: u16) -> Self {
        Self {
            provider,
            secret_path,
            token_path,
            callback_port: port,
            scopes: provider.scopes().iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub home_dir: PathBuf,
    /// Indexed in `Provider::ALL` order.
    pub providers: [ProviderConfig; 4],
    pub consent_timeout: Duration,
    pub expiry_buffer_seconds: u64,
    pub encryption_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file if present
        // If DOTENV_PATH is set, use that path, otherwise use default
        if let Ok(path) = env::var("DOTENV_PATH") {
            let _ = dotenv::from_path(path);
        } else {
            let _ = dotenv();
        }

        debug!("Loading provider configuration from environment");

        let home_dir = env::var("MCP_PRODUCTIVITY_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_dir());

        let google_secret = env::var("GOOGLE_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join("credentials.json"));
        let notion_secret = env::var("NOTION_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join("credentials_notion.json"));

        let provider_from_env = |provider: Provider| -> Result<ProviderConfig, ConfigError> {
            let prefix = provider.env_prefix();
            let token_path = env::var(format!("{}_TOKEN_PATH", prefix))
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_token_path(&home_dir, provider));
            let port_var = format!("{}_CALLBACK_PORT", prefix);
            let port = match parse_env_u64(&port_var)? {
                Some(p) => u16::try_from(p).map_err(|_| ConfigError::InvalidValue {
                    var: port_var.clone(),
                    value: p.to_string(),
                })?,
                None => provider.default_callback_port(),
            };
            let secret_path = if provider.is_google() {
                google_secret.clone()
            } else {
                notion_secret.clone()
            };
            Ok(ProviderConfig::new(provider, secret_path, token_path, port))
        };

        let providers = [
            provider_from_env(Provider::Gmail)?,
            provider_from_env(Provider::Calendar)?,
            provider_from_env(Provider::Drive)?,
            provider_from_env(Provider::Notion)?,
        ];

        let consent_timeout = Duration::from_secs(
            parse_env_u64("CONSENT_TIMEOUT_SECONDS")?.unwrap_or(DEFAULT_CONSENT_TIMEOUT_SECONDS),
        );
        let expiry_buffer_seconds =
            parse_env_u64("TOKEN_EXPIRY_BUFFER_SECONDS")?.unwrap_or(DEFAULT_EXPIRY_BUFFER_SECONDS);
        let encryption_key = env::var("TOKEN_ENCRYPTION_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let config = Config {
            home_dir,
            providers,
            consent_timeout,
            expiry_buffer_seconds,
            encryption_key,
        };
        config.validate()?;

        debug!("Provider configuration loaded successfully");
        Ok(config)
    }

    /// Default layout rooted at `home_dir`, ignoring the environment.
    pub fn with_home_dir(home_dir: impl AsRef<Path>) -> Self {
        let home_dir = home_dir.as_ref().to_path_buf();
        let providers = Provider::ALL.map(|provider| {
            let secret = if provider.is_google() {
                home_dir.join("credentials.json")
            } else {
                home_dir.join("credentials_notion.json")
            };
            ProviderConfig::new(
                provider,
                secret,
                default_token_path(&home_dir, provider),
                provider.default_callback_port(),
            )
        });

        Config {
            home_dir,
            providers,
            consent_timeout: Duration::from_secs(DEFAULT_CONSENT_TIMEOUT_SECONDS),
            expiry_buffer_seconds: DEFAULT_EXPIRY_BUFFER_SECONDS,
            encryption_key: None,
        }
    }

    /// Rejects two providers sharing a callback port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, a) in self.providers.iter().enumerate() {
            if let Some(b) = self.providers[i + 1..]
                .iter()
                .find(|b| b.callback_port == a.callback_port)
            {
                return Err(ConfigError::PortCollision {
                    port: a.callback_port,
                    first: a.provider.to_string(),
                    second: b.provider.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        &self.providers[provider.index()]
    }

    pub fn provider_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        &mut self.providers[provider.index()]
    }
}

fn default_home_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("mcp-productivity"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_token_path(home_dir: &Path, provider: Provider) -> PathBuf {
    home_dir.join(format!("token_{}.json", provider.name()))
}

fn parse_env_u64(var: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
