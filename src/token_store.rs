use crate::auth::Credential;
use crate::errors::{AuthError, AuthResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::Hmac;
use log::{debug, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const ENVELOPE_VERSION: u8 = 1;

/// Persistence for one provider's credential.
///
/// `load` never fails: a missing, unreadable or corrupt blob is reported as
/// `None` so the caller re-authenticates.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Credential>;
    fn save(&self, credential: &Credential) -> AuthResult<()>;
    /// Human readable location, for logs and diagnostics.
    fn location(&self) -> String;
}

// On-disk form of an encrypted credential
#[derive(Debug, Serialize, Deserialize)]
struct SealedToken {
    version: u8,
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// Credential stored as pretty JSON at a fixed path, optionally sealed with a
/// passphrase.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    passphrase: Option<String>,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase.filter(|p| !p.is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.passphrase.is_some()
    }

    fn decode(&self, content: &str) -> Option<Credential> {
        if let Ok(sealed) = serde_json::from_str::<SealedToken>(content) {
            let Some(passphrase) = self.passphrase.as_deref() else {
                warn!(
                    "Token file {} is encrypted but no TOKEN_ENCRYPTION_KEY is set",
                    self.path.display()
                );
                return None;
            };
            return match open(&sealed, passphrase) {
                Ok(plain) => serde_json::from_slice(&plain)
                    .map_err(|e| warn!("Decrypted token is not a credential: {}", e))
                    .ok(),
                Err(e) => {
                    warn!("Could not decrypt {}: {}", self.path.display(), e);
                    None
                }
            };
        }

        match serde_json::from_str::<Credential>(content) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!("Ignoring corrupt token file {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };
        self.decode(&content)
    }

    fn save(&self, credential: &Credential) -> AuthResult<()> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let content = match self.passphrase.as_deref() {
            Some(passphrase) => {
                let sealed = seal(json.as_bytes(), passphrase)?;
                serde_json::to_string_pretty(&sealed)
                    .map_err(|e| AuthError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?
            }
            None => json,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        write_private(&self.path, content.as_bytes())?;
        debug!("Token written to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(content)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> AuthResult<[u8; 32]> {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key)
        .map_err(|e| AuthError::Encryption(e.to_string()))?;
    Ok(key)
}

fn seal(plain: &[u8], passphrase: &str) -> AuthResult<SealedToken> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| AuthError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|e| AuthError::Encryption(e.to_string()))?;

    Ok(SealedToken {
        version: ENVELOPE_VERSION,
        salt: base64::encode(salt),
        nonce: base64::encode(nonce),
        ciphertext: base64::encode(ciphertext),
    })
}

fn open(sealed: &SealedToken, passphrase: &str) -> AuthResult<Vec<u8>> {
    if sealed.version != ENVELOPE_VERSION {
        return Err(AuthError::Encryption(format!(
            "unsupported envelope version {}",
            sealed.version
        )));
    }
    let decode = |field: &str| {
        base64::decode(field).map_err(|e| AuthError::Encryption(e.to_string()))
    };
    let salt = decode(&sealed.salt)?;
    let nonce = decode(&sealed.nonce)?;
    let ciphertext = decode(&sealed.ciphertext)?;
    if nonce.len() != NONCE_LEN {
        return Err(AuthError::Encryption("bad nonce length".to_string()));
    }

    let key = derive_key(passphrase, &salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| AuthError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| AuthError::Encryption("wrong key or tampered token".to_string()))
}
