//! Minimal-exposure holder for PIN material
//!
//! A [`SecretBuffer`] owns its contents, is never `Clone`, prints as
//! `[REDACTED]` and zero-fills its storage when dropped or wiped.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned secret that is zeroized on drop
pub struct SecretBuffer<T: Zeroize> {
    inner: T,
}

impl<T: Zeroize> SecretBuffer<T> {
    /// Take ownership of `inner`
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the secret contents
    pub fn expose(&self) -> &T {
        &self.inner
    }

    /// Zero-fill the contents now, without waiting for drop
    pub fn wipe(&mut self) {
        self.inner.zeroize();
    }
}

impl<T: Zeroize> Drop for SecretBuffer<T> {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl<T: Zeroize> ZeroizeOnDrop for SecretBuffer<T> {}

impl<T: Zeroize> fmt::Debug for SecretBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer([REDACTED])")
    }
}

impl<T: Zeroize + Default> Default for SecretBuffer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretBuffer::new(String::from("hunter2"));
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn test_wipe_clears_contents() {
        let mut secret = SecretBuffer::new(vec![0x41u8, 0x42, 0x43]);
        secret.wipe();
        assert!(secret.expose().is_empty());
    }
}
