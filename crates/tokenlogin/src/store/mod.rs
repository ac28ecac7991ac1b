//! Credential store abstraction
//!
//! A store is anything that holds keys behind a PIN and exposes:
//! - `initialize(path)`, which yields a handle or fails
//! - an explicit unlock call taking the encoded PIN
//! - protected operations that log in implicitly on first use
//!
//! Backends:
//! - [`soft::SoftTokenStore`] - software-emulated token in a directory
//! - `pkcs11::Pkcs11Store` - any PKCS#11 module (feature `pkcs11`)
//!
//! # Implicit login
//!
//! The PIN resolved from configuration is handed to the store at
//! initialization. The first protected operation on a handle that is not yet
//! logged in consumes that PIN (or the empty default PIN when none was
//! configured) and the handle drops its copy right after the attempt. An
//! explicit unlock discards the configured PIN unused.

pub mod soft;

#[cfg(feature = "pkcs11")]
pub mod pkcs11;

use tokenlogin_core::{EncodedPin, StorePath};
use tracing::debug;

use crate::error::{LoginError, Result};

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// A credential store that can be opened at a path
pub trait CredentialStore {
    type Handle: StoreHandle;

    /// Open the store at `path`, remembering `configured_pin` for implicit login
    fn initialize(&self, path: &StorePath, configured_pin: Option<EncodedPin>)
        -> Result<Self::Handle>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// An open store handle, exclusively owned by one login session
pub trait StoreHandle {
    /// Native login primitive with an encoded PIN
    fn login(&mut self, pin: &EncodedPin) -> Result<()>;

    /// Whether a login has succeeded on this handle
    fn is_logged_in(&self) -> bool;

    /// Take the PIN configured at initialization, leaving none behind
    fn take_configured_pin(&mut self) -> Option<EncodedPin>;

    /// AES-ECB encryption without padding. Requires a logged-in handle.
    fn encrypt_ecb_unchecked(&mut self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Token label, for diagnostics
    fn token_label(&self) -> &str;

    /// Unlock with a caller-supplied PIN. The configured PIN is discarded.
    fn explicit_unlock(&mut self, pin: &EncodedPin) -> Result<()> {
        if let Some(mut configured) = self.take_configured_pin() {
            debug!("discarding configured PIN in favour of explicit unlock");
            configured.wipe();
        }
        self.login(pin)
    }

    /// Protected operation: logs in implicitly first if needed
    fn encrypt_ecb(&mut self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_logged_in() {
            debug!("protected operation on locked token, logging in implicitly");
            let pin = self
                .take_configured_pin()
                .unwrap_or_else(|| EncodedPin::from_units(Vec::new()));
            self.login(&pin)?;
        }
        self.encrypt_ecb_unchecked(key, data)
    }
}

/// Validate ECB input sizes shared by all backends
pub(crate) fn check_ecb_input(key: &[u8], data: &[u8]) -> Result<()> {
    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(LoginError::CryptoOperation(format!(
            "Invalid AES key length: {} bytes",
            key.len()
        )));
    }
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(LoginError::CryptoOperation(format!(
            "Input of {} bytes is not a multiple of the AES block size",
            data.len()
        )));
    }
    Ok(())
}
