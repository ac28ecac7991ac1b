//! Tokenlogin - PIN-driven login against credential stores
//!
//! This crate drives logins into PIN-protected token stores:
//! - Implicit login with the PIN resolved from configuration
//! - Explicit login with a caller-supplied PIN
//! - A crypto probe proving the login actually took effect
//! - Outcome verification through a narrow inspection view
//!
//! # Optional Features
//!
//! - `pkcs11` - Enable PKCS#11 token support (NSS softoken, SoftHSM, etc.)

pub mod error;
pub mod session;
pub mod store;
pub mod verifier;

pub use error::{LoginError, LoginStage, Result};
pub use session::{Inspection, LoginSession, LoginState};
pub use store::soft::SoftTokenStore;
pub use store::{CredentialStore, StoreHandle};
pub use verifier::{verify, Expectation, Mismatch, VerificationError};

#[cfg(feature = "pkcs11")]
pub use store::pkcs11::Pkcs11Store;
