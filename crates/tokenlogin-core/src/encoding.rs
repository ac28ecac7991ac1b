//! PIN encoding for the store login primitive
//!
//! Token logins take the PIN as UTF-8 bytes, but the layers between the
//! configuration and the native login call handle it as a sequence of
//! characters. To keep every byte intact regardless of the platform charset,
//! the PIN is UTF-8 encoded and each byte is widened into its own 16-bit unit
//! (`unit = byte & 0xFF`). Narrowing the units gives back the exact UTF-8
//! bytes the token expects.

use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secret::SecretBuffer;
use crate::types::RawPin;

/// Store-ready PIN: one unit per UTF-8 byte of the raw PIN.
///
/// Zero-filled on drop. Meant to be handed to exactly one login call.
pub struct EncodedPin(SecretBuffer<Vec<u16>>);

impl EncodedPin {
    /// Wrap already widened units
    pub fn from_units(units: Vec<u16>) -> Self {
        Self(SecretBuffer::new(units))
    }

    pub fn units(&self) -> &[u16] {
        self.0.expose()
    }

    pub fn len(&self) -> usize {
        self.0.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose().is_empty()
    }

    /// Narrow back to the UTF-8 bytes handed to the native login call
    pub fn to_utf8(&self) -> Result<Zeroizing<Vec<u8>>> {
        narrow(self.units())
    }

    /// Narrow and decode back to text
    pub fn to_raw_pin(&self) -> Result<RawPin> {
        let bytes = self.to_utf8()?;
        let text = std::str::from_utf8(&bytes).map_err(|_| Error::InvalidUtf8)?;
        Ok(RawPin::new(text))
    }

    /// Zero-fill now
    pub fn wipe(&mut self) {
        self.0.wipe();
    }
}

impl fmt::Debug for EncodedPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedPin")
            .field("units", &self.len())
            .finish_non_exhaustive()
    }
}

/// UTF-8 encode `pin` and widen every byte into one unit
pub fn normalize(pin: &RawPin) -> EncodedPin {
    EncodedPin::from_units(widen(pin.expose().as_bytes()))
}

/// Widen bytes into units, one per byte
pub fn widen(bytes: &[u8]) -> Vec<u16> {
    bytes.iter().map(|&b| u16::from(b) & 0xFF).collect()
}

/// Narrow units back into bytes.
///
/// Fails if any unit is above `0xFF`, which normalizer output never is.
pub fn narrow(units: &[u16]) -> Result<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(Vec::with_capacity(units.len()));
    for (index, &unit) in units.iter().enumerate() {
        let byte = u8::try_from(unit).map_err(|_| Error::EncodingFailure { index, unit })?;
        bytes.push(byte);
    }
    Ok(bytes)
}
