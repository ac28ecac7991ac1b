//! Error types for token logins

use std::fmt;
use thiserror::Error;

use crate::session::LoginState;

/// Result type alias for login operations
pub type Result<T> = std::result::Result<T, LoginError>;

/// Stage of a login attempt, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Resolution,
    Encoding,
    Initialization,
    Unlock,
    CryptoOperation,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginStage::Resolution => "resolution",
            LoginStage::Encoding => "encoding",
            LoginStage::Initialization => "initialization",
            LoginStage::Unlock => "unlock",
            LoginStage::CryptoOperation => "crypto-op",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while resolving, unlocking or using a store
#[derive(Debug, Error)]
pub enum LoginError {
    /// PIN resolution or encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] tokenlogin_core::Error),

    /// No store handle could be obtained
    #[error("Store initialization failed: {0}")]
    StoreInitialization(String),

    /// Wrong or missing PIN at explicit or implicit login
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Login went through but the protected operation failed or returned bad output
    #[error("Crypto operation failed after login: {0}")]
    CryptoOperation(String),

    /// Call not allowed in the current session state
    #[error("Cannot {action} while session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: LoginState,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LoginError {
    /// Login stage this error belongs to, if it came from a login attempt
    pub fn stage(&self) -> Option<LoginStage> {
        match self {
            LoginError::Encoding(tokenlogin_core::Error::ResolutionAmbiguity(_)) => {
                Some(LoginStage::Resolution)
            }
            LoginError::Encoding(_) => Some(LoginStage::Encoding),
            LoginError::StoreInitialization(_) => Some(LoginStage::Initialization),
            LoginError::Authentication(_) => Some(LoginStage::Unlock),
            LoginError::CryptoOperation(_) => Some(LoginStage::CryptoOperation),
            LoginError::InvalidTransition { .. }
            | LoginError::Io(_)
            | LoginError::Serialization(_) => None,
        }
    }
}

impl From<serde_json::Error> for LoginError {
    fn from(e: serde_json::Error) -> Self {
        LoginError::Serialization(e.to_string())
    }
}
