//! Login outcome verification
//!
//! Cross-checks a finished session against what the caller expected: store
//! path, PIN source, resolved PIN, login mode and the final state. All
//! mismatches are collected. PIN values never appear in the report.

use thiserror::Error;
use tokenlogin_core::{LoginMode, PinSource, RawPin, StorePath};

use crate::session::{Inspection, LoginState};

/// What a login is expected to have used
#[derive(Debug)]
pub struct Expectation {
    pub store_path: StorePath,
    pub source: PinSource,
    pub mode: LoginMode,
    /// Resolved PIN to compare against; `None` skips the comparison
    pub pin: Option<RawPin>,
}

impl Expectation {
    pub fn new(store_path: StorePath, source: PinSource, mode: LoginMode) -> Self {
        Self {
            store_path,
            source,
            mode,
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: RawPin) -> Self {
        self.pin = Some(pin);
        self
    }
}

/// A single disagreement between expectation and outcome
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("Path is different than expected: {actual} (actual) vs {expected} (expected)")]
    StorePath { expected: StorePath, actual: StorePath },

    #[error("PIN source is different than expected: {actual} (actual) vs {expected} (expected)")]
    PinSource { expected: PinSource, actual: PinSource },

    #[error("PIN is different than expected")]
    Pin,

    #[error("Login mode is different than expected: {actual} (actual) vs {expected} (expected)")]
    Mode { expected: LoginMode, actual: LoginMode },

    #[error("No login attempted, expected {expected} login")]
    NoLogin { expected: LoginMode },

    #[error("Session is {0}, expected unlocked")]
    NotUnlocked(LoginState),
}

/// Every mismatch found during verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Login verification failed: {}", format_mismatches(.mismatches))]
pub struct VerificationError {
    pub mismatches: Vec<Mismatch>,
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compare an inspection against an expectation
pub fn verify(
    expectation: &Expectation,
    inspection: &Inspection<'_>,
) -> Result<(), VerificationError> {
    let mut mismatches = Vec::new();

    if inspection.store_path() != &expectation.store_path {
        mismatches.push(Mismatch::StorePath {
            expected: expectation.store_path.clone(),
            actual: inspection.store_path().clone(),
        });
    }

    if inspection.pin_source() != expectation.source {
        mismatches.push(Mismatch::PinSource {
            expected: expectation.source,
            actual: inspection.pin_source(),
        });
    }

    if let Some(pin) = &expectation.pin {
        if !inspection.resolved_pin_matches(Some(pin.expose())) {
            mismatches.push(Mismatch::Pin);
        }
    }

    match inspection.mode() {
        Some(actual) if actual != expectation.mode => mismatches.push(Mismatch::Mode {
            expected: expectation.mode,
            actual,
        }),
        Some(_) => {}
        None => mismatches.push(Mismatch::NoLogin {
            expected: expectation.mode,
        }),
    }

    if inspection.state() != LoginState::Unlocked {
        mismatches.push(Mismatch::NotUnlocked(inspection.state()));
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(VerificationError { mismatches })
    }
}
