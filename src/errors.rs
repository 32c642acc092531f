use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },

    #[error("Callback port {port} is assigned to both {first} and {second}")]
    PortCollision {
        port: u16,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "{provider} client secret not found at {path}. Download the OAuth client credentials \
         and place them at this path (or point the matching *_CREDENTIALS_PATH variable at them)."
    )]
    MissingSecretFile { provider: String, path: PathBuf },

    #[error("Invalid client secret file {path}: {reason}")]
    InvalidSecretFile { path: PathBuf, reason: String },

    #[error("Redirect URI {redirect_uri} cannot reach the callback listener: {reason}")]
    RedirectMismatch { redirect_uri: String, reason: String },

    #[error("Consent flow failed: {0}")]
    ConsentFailed(String),

    #[error("Consent flow timed out after {0} seconds")]
    ConsentTimeout(u64),

    #[error("OAuth state mismatch in consent callback")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Failed to refresh token: {0}")]
    RefreshFailed(String),

    #[error("Credential for {0} is expired and cannot be refreshed")]
    NotRefreshable(String),

    #[error("Token encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error (HTTP {status}): {message}")]
    HttpError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Failures of the remote call itself, as opposed to local or auth problems.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::NetworkError(_) | ApiError::HttpError { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::ParseError(err.to_string())
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
pub type ApiResult<T> = std::result::Result<T, ApiError>;
