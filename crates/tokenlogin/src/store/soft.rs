//! Software-emulated token
//!
//! A token lives in a directory holding `token.json`, which records the
//! token label and an Argon2id hash of the PIN's UTF-8 bytes. Logging in
//! verifies the narrowed PIN bytes against that hash, the same bytes a
//! native `C_Login` would receive. Once logged in the token performs AES-ECB
//! encryption with caller-supplied keys.

use std::fs;
use std::io::Write;
use std::path::Path;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokenlogin_core::{normalize, EncodedPin, RawPin, StorePath};
use tracing::{debug, info, warn};

use super::{check_ecb_input, CredentialStore, StoreHandle, AES_BLOCK_SIZE};
use crate::error::{LoginError, Result};

/// Token metadata file inside the store directory
pub const TOKEN_FILE: &str = "token.json";

/// Label given to tokens provisioned without one
pub const DEFAULT_TOKEN_LABEL: &str = "Software Token";

const TOKEN_FORMAT_VERSION: u32 = 1;

/// Token storage format (persisted to disk)
#[derive(Serialize, Deserialize)]
struct TokenFile {
    /// Token label
    label: String,
    /// Argon2id hash of the PIN's UTF-8 bytes
    pin_hash: String,
    /// Version for future migrations
    version: u32,
}

/// Creates and opens software tokens
#[derive(Debug, Clone, Default)]
pub struct SoftTokenStore;

impl SoftTokenStore {
    pub fn new() -> Self {
        Self
    }

    /// Create (or re-key) the token in `dir` with `pin`
    pub fn provision(dir: &Path, label: &str, pin: &RawPin) -> Result<()> {
        fs::create_dir_all(dir)?;

        let encoded = normalize(pin);
        let pin_hash = hash_pin(&encoded)?;

        let token = TokenFile {
            label: label.to_string(),
            pin_hash,
            version: TOKEN_FORMAT_VERSION,
        };
        save_token(&dir.join(TOKEN_FILE), &token)?;

        info!(dir = %dir.display(), label, "software token provisioned");
        Ok(())
    }

    /// Whether `dir` holds a provisioned token
    pub fn exists(dir: &Path) -> bool {
        dir.join(TOKEN_FILE).is_file()
    }
}

impl CredentialStore for SoftTokenStore {
    type Handle = SoftTokenHandle;

    fn initialize(
        &self,
        path: &StorePath,
        configured_pin: Option<EncodedPin>,
    ) -> Result<SoftTokenHandle> {
        let token_path = path.directory().join(TOKEN_FILE);
        debug!(path = %path, "opening software token");

        let contents = fs::read_to_string(&token_path).map_err(|e| {
            LoginError::StoreInitialization(format!(
                "No software token at {}: {}",
                token_path.display(),
                e
            ))
        })?;
        let token: TokenFile = serde_json::from_str(&contents).map_err(|e| {
            LoginError::StoreInitialization(format!("Failed to parse token file: {}", e))
        })?;

        if token.version != TOKEN_FORMAT_VERSION {
            return Err(LoginError::StoreInitialization(format!(
                "Unsupported token format version {}",
                token.version
            )));
        }

        // Reject a corrupt hash now rather than at login
        PasswordHash::new(&token.pin_hash).map_err(|e| {
            LoginError::StoreInitialization(format!("Invalid stored PIN hash: {}", e))
        })?;

        Ok(SoftTokenHandle {
            label: token.label,
            pin_hash: token.pin_hash,
            configured_pin,
            logged_in: false,
        })
    }

    fn backend(&self) -> &'static str {
        "soft"
    }
}

/// Open software token
pub struct SoftTokenHandle {
    label: String,
    pin_hash: String,
    configured_pin: Option<EncodedPin>,
    logged_in: bool,
}

impl StoreHandle for SoftTokenHandle {
    fn login(&mut self, pin: &EncodedPin) -> Result<()> {
        let parsed_hash = PasswordHash::new(&self.pin_hash)
            .map_err(|e| LoginError::Authentication(format!("Invalid stored hash: {}", e)))?;

        let pin_bytes = pin.to_utf8()?;
        if Argon2::default()
            .verify_password(&pin_bytes, &parsed_hash)
            .is_err()
        {
            warn!(label = %self.label, "software token rejected PIN");
            return Err(LoginError::Authentication(format!(
                "Incorrect PIN for token '{}'",
                self.label
            )));
        }

        self.logged_in = true;
        debug!(label = %self.label, "software token logged in");
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn take_configured_pin(&mut self) -> Option<EncodedPin> {
        self.configured_pin.take()
    }

    fn encrypt_ecb_unchecked(&mut self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if !self.logged_in {
            return Err(LoginError::Authentication(
                "Token is not logged in".to_string(),
            ));
        }
        check_ecb_input(key, data)?;

        match key.len() {
            16 => ecb_encrypt::<Aes128>(key, data),
            24 => ecb_encrypt::<Aes192>(key, data),
            _ => ecb_encrypt::<Aes256>(key, data),
        }
    }

    fn token_label(&self) -> &str {
        &self.label
    }
}

impl Drop for SoftTokenHandle {
    fn drop(&mut self) {
        if let Some(mut pin) = self.configured_pin.take() {
            pin.wipe();
        }
        debug!(label = %self.label, "software token closed");
    }
}

fn ecb_encrypt<C: BlockEncrypt + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slice(key)
        .map_err(|e| LoginError::CryptoOperation(format!("Invalid AES key: {}", e)))?;

    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(out)
}

/// Hash the narrowed PIN bytes using Argon2id
fn hash_pin(pin: &EncodedPin) -> Result<String> {
    let pin_bytes = pin.to_utf8()?;
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(&pin_bytes, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LoginError::Serialization(format!("Failed to hash PIN: {}", e)))
}

/// Save token metadata atomically. The file is created owner-only before
/// anything is written to it.
fn save_token(path: &Path, token: &TokenFile) -> Result<()> {
    let contents = serde_json::to_string_pretty(token)?;

    let temp_path = path.with_extension("json.tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path)?;
    #[cfg(unix)]
    {
        // mode() only applies to newly created files
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}
