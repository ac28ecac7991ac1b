//! Tokenlogin Core - PIN resolution, encoding and secret handling
//!
//! This crate decides which PIN a token login uses and in what form:
//! - Precedence between configured, environment and file-sourced PINs
//! - Widening of the UTF-8 PIN bytes for the store login primitive
//! - Properties-file escaping for configured PINs
//! - Zeroizing holders for all PIN material
//!
//! It performs no store I/O; see the `tokenlogin` crate for the login
//! state machine.

pub mod config;
pub mod encoding;
pub mod error;
pub mod properties;
pub mod resolver;
pub mod secret;
pub mod types;

pub use config::{ConfigLayer, ConfigLayers, ResolvedCredentials, STORE_PATH_KEY, STORE_PIN_KEY};
pub use encoding::{normalize, EncodedPin};
pub use error::{Error, Result};
pub use properties::{escape_properties_value, unescape_properties_value, Properties};
pub use resolver::{
    resolve, resolve_descriptor, EnvSource, PinCandidates, PinDescriptor, ProcessEnv, Resolution,
};
pub use secret::SecretBuffer;
pub use types::{LoginMode, PinSource, RawPin, StorePath, DEFAULT_STORE_PATH};
