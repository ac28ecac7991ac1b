//! PKCS#11 token integration
//!
//! Supports any PKCS#11 compatible token, including:
//! - NSS softoken
//! - SoftHSM 2 (for development/testing)
//! - YubiHSM 2
//! - Hardware tokens exposing a user PIN
//!
//! # Configuration
//!
//! The store path names the PKCS#11 module (`.so`/`.dylib`/`.dll`) to load;
//! an optional `sql:`/`dbm:` prefix is ignored. The slot index is part of the
//! [`Pkcs11Store`] itself.
//!
//! # Login
//!
//! `C_Login` receives the narrowed UTF-8 bytes of the encoded PIN through
//! `login_with_raw`, so no charset conversion happens on the way in.

use std::sync::Arc;

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, KeyType, ObjectClass};
use cryptoki::session::{Session, UserType};
use cryptoki::types::RawAuthPin;
use tokenlogin_core::{EncodedPin, StorePath};
use tracing::{debug, info, warn};

use super::{check_ecb_input, CredentialStore, StoreHandle};
use crate::error::{LoginError, Result};

/// Opens PKCS#11 tokens
#[derive(Debug, Clone, Default)]
pub struct Pkcs11Store {
    /// Index into the list of slots with a token present (usually 0)
    pub slot: usize,
}

impl Pkcs11Store {
    pub fn new(slot: usize) -> Self {
        Self { slot }
    }
}

impl CredentialStore for Pkcs11Store {
    type Handle = Pkcs11Handle;

    fn initialize(
        &self,
        path: &StorePath,
        configured_pin: Option<EncodedPin>,
    ) -> Result<Pkcs11Handle> {
        let module = path.directory();
        info!(module = %module.display(), "loading PKCS#11 module");

        let ctx = Pkcs11::new(&module).map_err(|e| {
            LoginError::StoreInitialization(format!("Failed to load PKCS#11 library: {}", e))
        })?;

        ctx.initialize(CInitializeArgs::OsThreads).map_err(|e| {
            LoginError::StoreInitialization(format!("Failed to initialize PKCS#11: {}", e))
        })?;

        let ctx = Arc::new(ctx);

        let slots = ctx.get_slots_with_token().map_err(|e| {
            LoginError::StoreInitialization(format!("Failed to get slots: {}", e))
        })?;

        let slot = *slots.get(self.slot).ok_or_else(|| {
            LoginError::StoreInitialization(format!(
                "Slot {} not found ({} slots with a token)",
                self.slot,
                slots.len()
            ))
        })?;

        let token_label = ctx
            .get_token_info(slot)
            .map(|info| info.label().trim().to_string())
            .unwrap_or_else(|_| "Unknown Token".to_string());

        let session = ctx.open_rw_session(slot).map_err(|e| {
            LoginError::StoreInitialization(format!("Failed to open session: {}", e))
        })?;

        debug!(token = %token_label, "PKCS#11 session opened");

        Ok(Pkcs11Handle {
            _ctx: ctx,
            session,
            token_label,
            configured_pin,
            logged_in: false,
        })
    }

    fn backend(&self) -> &'static str {
        "pkcs11"
    }
}

/// Open PKCS#11 session
pub struct Pkcs11Handle {
    _ctx: Arc<Pkcs11>,
    session: Session,
    token_label: String,
    configured_pin: Option<EncodedPin>,
    logged_in: bool,
}

impl StoreHandle for Pkcs11Handle {
    fn login(&mut self, pin: &EncodedPin) -> Result<()> {
        let pin_bytes = pin.to_utf8()?;
        let raw = RawAuthPin::new(pin_bytes.to_vec());

        self.session
            .login_with_raw(UserType::User, &raw)
            .map_err(|e| {
                warn!(token = %self.token_label, "PKCS#11 login rejected");
                LoginError::Authentication(format!("Failed to login: {}", e))
            })?;

        self.logged_in = true;
        info!(token = %self.token_label, "PKCS#11 session logged in");
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn take_configured_pin(&mut self) -> Option<EncodedPin> {
        self.configured_pin.take()
    }

    fn encrypt_ecb_unchecked(&mut self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        check_ecb_input(key, data)?;

        let template = vec![
            Attribute::Class(ObjectClass::SECRET_KEY),
            Attribute::KeyType(KeyType::AES),
            Attribute::Value(key.to_vec()),
            Attribute::Token(false),
            Attribute::Encrypt(true),
        ];

        let key_handle = self.session.create_object(&template).map_err(|e| {
            LoginError::CryptoOperation(format!("Failed to import AES key: {}", e))
        })?;

        let result = self
            .session
            .encrypt(&Mechanism::AesEcb, key_handle, data)
            .map_err(|e| LoginError::CryptoOperation(format!("AES-ECB encryption failed: {}", e)));

        if let Err(e) = self.session.destroy_object(key_handle) {
            warn!("Failed to destroy session key object: {}", e);
        }

        result
    }

    fn token_label(&self) -> &str {
        &self.token_label
    }
}

impl Drop for Pkcs11Handle {
    fn drop(&mut self) {
        if let Some(mut pin) = self.configured_pin.take() {
            pin.wipe();
        }
        if self.logged_in {
            let _ = self.session.logout();
        }
        debug!("PKCS#11 session closed");
    }
}
