//! Error types for PIN resolution and encoding

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving or encoding a PIN
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// More than one PIN source claimed authority.
    ///
    /// Resolution is total and ordered, so this is never produced today.
    #[error("PIN resolution is ambiguous: {0}")]
    ResolutionAmbiguity(String),

    /// A widened unit did not fit in a single byte
    #[error("Encoding failure: unit {unit:#06x} at index {index} does not fit in one byte")]
    EncodingFailure { index: usize, unit: u16 },

    /// Narrowed bytes were not valid UTF-8
    #[error("Encoding failure: narrowed PIN is not valid UTF-8")]
    InvalidUtf8,

    /// Malformed `\uXXXX` or trailing backslash in a properties value
    #[error("Malformed escape in properties value at offset {0}")]
    MalformedEscape(usize),
}
