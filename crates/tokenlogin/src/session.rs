//! Login state machine
//!
//! A [`LoginSession`] owns one store handle and drives exactly one login:
//!
//! ```text
//! Idle -> AttemptImplicit -> Unlocked | Failed
//! Idle -> AttemptExplicit -> Unlocked | Failed
//! ```
//!
//! The handle is created on the first explicit unlock or protected
//! operation. `Failed` is final. `Unlocked` is final for login purposes;
//! protected operations continue, and one that returns a wrong-length result
//! moves the session to `Failed`. Nothing is retried.

use std::fmt;

use tokenlogin_core::{normalize, LoginMode, PinSource, RawPin, ResolvedCredentials, StorePath};
use tracing::{debug, info, warn};

use crate::error::{LoginError, LoginStage, Result};
use crate::store::{CredentialStore, StoreHandle, AES_BLOCK_SIZE};

/// State of a login session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    /// Nothing attempted yet
    #[default]
    Idle,
    /// Waiting on the store's own login during a protected operation
    AttemptImplicit,
    /// Explicit unlock in progress
    AttemptExplicit,
    /// Store unlocked
    Unlocked,
    /// Login attempt failed at the given stage
    Failed(LoginStage),
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Unlocked | LoginState::Failed(_))
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::Idle => f.write_str("idle"),
            LoginState::AttemptImplicit => f.write_str("attempting implicit login"),
            LoginState::AttemptExplicit => f.write_str("attempting explicit login"),
            LoginState::Unlocked => f.write_str("unlocked"),
            LoginState::Failed(stage) => write!(f, "failed at {}", stage),
        }
    }
}

/// One login transaction against one store
pub struct LoginSession<S: CredentialStore> {
    store: S,
    credentials: ResolvedCredentials,
    handle: Option<S::Handle>,
    state: LoginState,
    mode: Option<LoginMode>,
}

impl<S: CredentialStore> LoginSession<S> {
    /// Create an idle session. The store is not touched yet.
    pub fn new(store: S, credentials: ResolvedCredentials) -> Self {
        Self {
            store,
            credentials,
            handle: None,
            state: LoginState::Idle,
            mode: None,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn mode(&self) -> Option<LoginMode> {
        self.mode
    }

    pub fn store_path(&self) -> &StorePath {
        &self.credentials.store_path
    }

    /// Token label, once the store has been opened
    pub fn token_label(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.token_label())
    }

    /// Unlock with a caller-supplied PIN.
    ///
    /// Any configured PIN is ignored. The encoded PIN is zeroized on return,
    /// whatever the outcome.
    pub fn login_explicit(&mut self, pin: &RawPin) -> Result<()> {
        if self.state != LoginState::Idle {
            return Err(self.invalid("log in explicitly"));
        }
        self.state = LoginState::AttemptExplicit;
        self.mode = Some(LoginMode::Explicit);
        info!(path = %self.credentials.store_path, "explicit login");

        let encoded = normalize(pin);
        let outcome = self
            .handle_mut()
            .and_then(|handle| handle.explicit_unlock(&encoded));
        drop(encoded);

        self.settle(outcome)?;
        self.state = LoginState::Unlocked;
        info!("explicit login succeeded");
        Ok(())
    }

    /// AES-ECB encryption without padding, a protected operation.
    ///
    /// On an idle session this triggers the store's implicit login with the
    /// configured PIN. Output must be exactly as long as the input.
    pub fn encrypt_ecb(&mut self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self.state {
            LoginState::Idle => {
                self.state = LoginState::AttemptImplicit;
                self.mode = Some(LoginMode::Implicit);
                info!(
                    path = %self.credentials.store_path,
                    source = %self.credentials.pin_source(),
                    "implicit login on first protected operation"
                );
            }
            LoginState::Unlocked => {}
            _ => return Err(self.invalid("run a protected operation")),
        }

        let outcome = self
            .handle_mut()
            .and_then(|handle| handle.encrypt_ecb(key, data));
        let output = self.settle(outcome)?;

        if output.len() != data.len() {
            let err = LoginError::CryptoOperation(format!(
                "Expected {} bytes of ciphertext, got {}",
                data.len(),
                output.len()
            ));
            return self.settle(Err(err));
        }

        if self.state == LoginState::AttemptImplicit {
            self.state = LoginState::Unlocked;
            info!("implicit login succeeded");
        }
        Ok(output)
    }

    /// Encrypt one zero block under a zero AES-128 key and check the length
    pub fn probe(&mut self) -> Result<()> {
        let key = [0u8; AES_BLOCK_SIZE];
        let block = [0u8; AES_BLOCK_SIZE];
        self.encrypt_ecb(&key, &block)?;
        debug!("crypto operation after login succeeded");
        Ok(())
    }

    /// Narrow read-only view for verification
    pub fn inspect(&self) -> Inspection<'_> {
        Inspection {
            store_path: &self.credentials.store_path,
            pin_source: self.credentials.pin_source(),
            resolved_pin: self.credentials.resolution.pin(),
            mode: self.mode,
            state: self.state,
            logged_in: self.handle.as_ref().is_some_and(|h| h.is_logged_in()),
        }
    }

    /// Open the store on first use
    fn handle_mut(&mut self) -> Result<&mut S::Handle> {
        if self.handle.is_none() {
            let configured = self.credentials.resolution.pin().map(normalize);
            debug!(backend = self.store.backend(), "initializing store");
            let handle = self
                .store
                .initialize(&self.credentials.store_path, configured)?;
            self.handle = Some(handle);
        }
        self.handle.as_mut().ok_or_else(|| {
            LoginError::StoreInitialization("Store handle unavailable".to_string())
        })
    }

    /// Record a failure as the session's terminal state
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            let stage = e.stage().unwrap_or(LoginStage::Initialization);
            warn!(%stage, error = %e, "login session failed");
            self.state = LoginState::Failed(stage);
        }
        outcome
    }

    fn invalid(&self, action: &'static str) -> LoginError {
        LoginError::InvalidTransition {
            action,
            state: self.state,
        }
    }
}

/// Read-only view of a session: what was used and how it ended.
///
/// Never hands out the PIN; [`Inspection::resolved_pin_matches`] compares it.
#[derive(Debug, Clone, Copy)]
pub struct Inspection<'a> {
    store_path: &'a StorePath,
    pin_source: PinSource,
    resolved_pin: Option<&'a RawPin>,
    mode: Option<LoginMode>,
    state: LoginState,
    logged_in: bool,
}

impl Inspection<'_> {
    pub fn store_path(&self) -> &StorePath {
        self.store_path
    }

    pub fn pin_source(&self) -> PinSource {
        self.pin_source
    }

    pub fn mode(&self) -> Option<LoginMode> {
        self.mode
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    /// Whether the resolved PIN equals `expected`. An unresolved PIN matches `None`.
    pub fn resolved_pin_matches(&self, expected: Option<&str>) -> bool {
        match (self.resolved_pin, expected) {
            (Some(pin), Some(expected)) => pin.expose() == expected,
            (None, None) => true,
            _ => false,
        }
    }
}
