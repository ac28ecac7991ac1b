//! PIN resolution
//!
//! Picks the one authoritative PIN for a login attempt out of up to three
//! candidates, highest precedence first:
//!
//! 1. a configured value, even when it is the empty string
//! 2. the value of a designated environment variable
//! 3. the first line of a designated file
//!
//! When none is present the resolution is [`PinSource::None`] and the store
//! falls back to its own default. Resolution never fails.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::types::{PinSource, RawPin};

/// Descriptor prefix for a literal PIN
pub const PIN_PREFIX: &str = "pin:";
/// Descriptor prefix naming an environment variable
pub const ENV_PREFIX: &str = "env:";
/// Descriptor prefix naming a PIN file
pub const FILE_PREFIX: &str = "file:";

/// Lookup of environment variables, injected so resolution stays pure
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<Zeroizing<String>>;
}

/// The current process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<Zeroizing<String>> {
        match std::env::var(name) {
            Ok(value) => Some(Zeroizing::new(value)),
            Err(std::env::VarError::NotPresent) => None,
            Err(std::env::VarError::NotUnicode(_)) => {
                warn!(variable = name, "PIN environment variable is not valid Unicode");
                None
            }
        }
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<Zeroizing<String>> {
        self.get(name).map(|v| Zeroizing::new(v.clone()))
    }
}

/// Value of the store-PIN configuration key
#[derive(Debug, PartialEq, Eq)]
pub enum PinDescriptor {
    /// `pin:<value>`, or a value with no recognised prefix
    Literal(RawPin),
    /// `env:<VARIABLE>`
    Environment(String),
    /// `file:<path>`
    File(PathBuf),
}

impl PinDescriptor {
    /// Classify a configured store-PIN value
    pub fn parse(value: &str) -> Self {
        if let Some(pin) = value.strip_prefix(PIN_PREFIX) {
            PinDescriptor::Literal(RawPin::new(pin))
        } else if let Some(name) = value.strip_prefix(ENV_PREFIX) {
            PinDescriptor::Environment(name.to_string())
        } else if let Some(path) = value.strip_prefix(FILE_PREFIX) {
            PinDescriptor::File(PathBuf::from(path))
        } else {
            debug!("store PIN value has no pin:/env:/file: prefix, taking it literally");
            PinDescriptor::Literal(RawPin::new(value))
        }
    }
}

/// Outcome of a resolution: the chosen PIN and where it came from
#[derive(Debug, PartialEq, Eq)]
pub struct Resolution {
    pin: Option<RawPin>,
    source: PinSource,
}

impl Resolution {
    pub fn new(pin: RawPin, source: PinSource) -> Self {
        debug_assert!(source != PinSource::None);
        Self {
            pin: Some(pin),
            source,
        }
    }

    /// Nothing configured
    pub fn absent() -> Self {
        Self {
            pin: None,
            source: PinSource::None,
        }
    }

    pub fn source(&self) -> PinSource {
        self.source
    }

    pub fn pin(&self) -> Option<&RawPin> {
        self.pin.as_ref()
    }

    pub fn into_pin(self) -> Option<RawPin> {
        self.pin
    }

    pub fn is_absent(&self) -> bool {
        self.source == PinSource::None
    }
}

/// Candidate PIN values gathered before precedence is applied
#[derive(Debug, Default)]
pub struct PinCandidates {
    config: Option<RawPin>,
    environment: Option<RawPin>,
    file: Option<RawPin>,
}

impl PinCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, pin: RawPin) -> Self {
        self.config = Some(pin);
        self
    }

    pub fn with_environment(mut self, pin: RawPin) -> Self {
        self.environment = Some(pin);
        self
    }

    /// Use the first line of `contents` as the file candidate
    pub fn with_file_contents(mut self, contents: &str) -> Self {
        self.file = Some(RawPin::new(first_line(contents)));
        self
    }

    /// Look up the variable `name` and keep it as the environment candidate
    pub fn with_env_var(mut self, name: &str, env: &dyn EnvSource) -> Self {
        match env.var(name) {
            Some(value) => self.environment = Some(RawPin::new(value.as_str())),
            None => warn!(variable = name, "PIN environment variable is not set"),
        }
        self
    }

    /// Read `path` and keep its first line as the file candidate
    pub fn with_pin_file(mut self, path: &Path) -> Self {
        if let Some(pin) = read_pin_file(path) {
            self.file = Some(pin);
        }
        self
    }

    /// Fill the candidate a descriptor points at
    pub fn with_descriptor(self, descriptor: PinDescriptor, env: &dyn EnvSource) -> Self {
        match descriptor {
            PinDescriptor::Literal(pin) => self.with_config(pin),
            PinDescriptor::Environment(name) => self.with_env_var(&name, env),
            PinDescriptor::File(path) => self.with_pin_file(&path),
        }
    }

    /// Apply precedence. Exactly one source wins.
    pub fn resolve(self) -> Resolution {
        let resolution = if let Some(pin) = self.config {
            Resolution::new(pin, PinSource::Config)
        } else if let Some(pin) = self.environment {
            Resolution::new(pin, PinSource::Environment)
        } else if let Some(pin) = self.file {
            Resolution::new(pin, PinSource::File)
        } else {
            Resolution::absent()
        };
        debug!(source = %resolution.source(), "resolved store PIN");
        resolution
    }
}

/// Resolve from plain values: configured > environment > file contents > none
pub fn resolve(
    config_value: Option<&str>,
    environment_value: Option<&str>,
    file_contents: Option<&str>,
) -> Resolution {
    let mut candidates = PinCandidates::new();
    if let Some(value) = config_value {
        candidates = candidates.with_config(RawPin::new(value));
    }
    if let Some(value) = environment_value {
        candidates = candidates.with_environment(RawPin::new(value));
    }
    if let Some(contents) = file_contents {
        candidates = candidates.with_file_contents(contents);
    }
    candidates.resolve()
}

/// Resolve a single store-PIN descriptor, or none
pub fn resolve_descriptor(descriptor: Option<&str>, env: &dyn EnvSource) -> Resolution {
    match descriptor {
        Some(value) => PinCandidates::new()
            .with_descriptor(PinDescriptor::parse(value), env)
            .resolve(),
        None => Resolution::absent(),
    }
}

/// First line of a PIN file, trailing whitespace removed. Later lines are ignored.
pub fn first_line(contents: &str) -> &str {
    contents
        .split(['\n', '\r'])
        .next()
        .unwrap_or_default()
        .trim_end()
}

fn read_pin_file(path: &Path) -> Option<RawPin> {
    let bytes = match fs::read(path) {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read PIN file");
            return None;
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) => Some(RawPin::new(first_line(text))),
        Err(_) => {
            warn!(path = %path.display(), "PIN file is not valid UTF-8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_with(name: &str, value: &str) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(name.to_string(), value.to_string());
        env
    }

    #[test]
    fn test_empty_config_is_not_absent() {
        let resolution = resolve(Some(""), Some("from-env"), None);
        assert_eq!(resolution.source(), PinSource::Config);
        assert_eq!(resolution.pin().map(RawPin::expose), Some(""));
    }

    #[test]
    fn test_precedence() {
        let r = resolve(Some("cfg"), Some("env"), Some("file\n"));
        assert_eq!(r.source(), PinSource::Config);
        assert_eq!(r.pin().unwrap().expose(), "cfg");

        let r = resolve(None, Some("env"), Some("file\n"));
        assert_eq!(r.source(), PinSource::Environment);
        assert_eq!(r.pin().unwrap().expose(), "env");

        let r = resolve(None, None, Some("file\n2nd line with garbage"));
        assert_eq!(r.source(), PinSource::File);
        assert_eq!(r.pin().unwrap().expose(), "file");

        let r = resolve(None, None, None);
        assert!(r.is_absent());
        assert!(r.pin().is_none());
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("abc\r\ngarbage"), "abc");
        assert_eq!(first_line("abc  \t\n"), "abc");
        assert_eq!(first_line("\n2nd line with garbage"), "");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_descriptor_parse() {
        assert_eq!(
            PinDescriptor::parse("pin:"),
            PinDescriptor::Literal(RawPin::empty())
        );
        assert_eq!(
            PinDescriptor::parse("env:NSSDB_PIN_ENV_VAR"),
            PinDescriptor::Environment("NSSDB_PIN_ENV_VAR".to_string())
        );
        assert_eq!(
            PinDescriptor::parse("file:/tmp/pin"),
            PinDescriptor::File(PathBuf::from("/tmp/pin"))
        );
        assert_eq!(
            PinDescriptor::parse("Invalid PIN, must be ignored"),
            PinDescriptor::Literal(RawPin::new("Invalid PIN, must be ignored"))
        );
    }

    #[test]
    fn test_resolve_env_descriptor() {
        let env = env_with("NSSDB_PIN_ENV_VAR", "\u{A4F7}42");
        let r = resolve_descriptor(Some("env:NSSDB_PIN_ENV_VAR"), &env);
        assert_eq!(r.source(), PinSource::Environment);
        assert_eq!(r.pin().unwrap().expose(), "\u{A4F7}42");
    }

    #[test]
    fn test_env_empty_value_is_kept() {
        let env = env_with("PIN", "");
        let r = resolve_descriptor(Some("env:PIN"), &env);
        assert_eq!(r.source(), PinSource::Environment);
        assert!(r.pin().unwrap().is_empty());
    }

    #[test]
    fn test_missing_env_falls_through() {
        let env = HashMap::new();
        let r = resolve_descriptor(Some("env:MISSING"), &env);
        assert!(r.is_absent());
    }

    #[test]
    fn test_resolve_file_descriptor() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "s3cret\n2nd line with garbage").unwrap();

        let descriptor = format!("file:{}", file.path().display());
        let r = resolve_descriptor(Some(descriptor.as_str()), &HashMap::new());
        assert_eq!(r.source(), PinSource::File);
        assert_eq!(r.pin().unwrap().expose(), "s3cret");
    }

    #[test]
    fn test_missing_file_falls_through() {
        let r = resolve_descriptor(Some("file:/nonexistent/tokenlogin/pin"), &HashMap::new());
        assert!(r.is_absent());
    }

    #[test]
    fn test_no_descriptor() {
        assert!(resolve_descriptor(None, &HashMap::new()).is_absent());
    }
}
