//! Core types shared by the resolver, the normalizer and the login session

use std::fmt;
use std::path::PathBuf;

use crate::secret::SecretBuffer;

/// Store path used when none is configured
pub const DEFAULT_STORE_PATH: &str = "sql:/etc/pki/nssdb";

/// Where the authoritative PIN came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinSource {
    /// Configured value, possibly empty
    Config,
    /// A designated environment variable
    Environment,
    /// The first line of a designated file
    File,
    /// Nothing configured; store defaults apply
    None,
}

impl fmt::Display for PinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinSource::Config => "config",
            PinSource::Environment => "environment",
            PinSource::File => "file",
            PinSource::None => "none",
        };
        f.write_str(name)
    }
}

/// How the store gets unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginMode {
    /// The store applies its configured PIN on first protected use
    Implicit,
    /// The caller hands the PIN to an explicit unlock call
    Explicit,
}

impl fmt::Display for LoginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMode::Implicit => f.write_str("implicit"),
            LoginMode::Explicit => f.write_str("explicit"),
        }
    }
}

/// PIN text as configured. May be empty and may hold any code point.
pub struct RawPin(SecretBuffer<String>);

impl RawPin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(SecretBuffer::new(pin.into()))
    }

    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// Borrow the PIN text. Callers must not log or persist it.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose().is_empty()
    }

    /// Number of Unicode code points
    pub fn char_count(&self) -> usize {
        self.0.expose().chars().count()
    }
}

impl fmt::Debug for RawPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPin")
            .field("chars", &self.char_count())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for RawPin {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for RawPin {}

/// Location of a credential store, e.g. `sql:/etc/pki/nssdb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath(String);

impl StorePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Database flavour prefix (`sql` or `dbm`), if present
    pub fn scheme(&self) -> Option<&str> {
        self.split().0
    }

    /// Directory part with any `sql:`/`dbm:` prefix removed
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(self.split().1)
    }

    fn split(&self) -> (Option<&str>, &str) {
        for scheme in ["sql", "dbm"] {
            if let Some(rest) = self
                .0
                .strip_prefix(scheme)
                .and_then(|rest| rest.strip_prefix(':'))
            {
                return (Some(scheme), rest);
            }
        }
        (None, &self.0)
    }
}

impl Default for StorePath {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
