//! Store-path and store-PIN configuration
//!
//! Configuration comes from two explicit layers instead of process-wide
//! state: the system layer (per-invocation overrides) and the security layer
//! (a properties file). A key present in the system layer wins even when its
//! value is empty. An empty security-layer value counts as unset.

use tracing::debug;

use crate::properties::Properties;
use crate::resolver::{resolve_descriptor, EnvSource, Resolution};
use crate::types::{PinSource, StorePath};

/// Key holding the store location
pub const STORE_PATH_KEY: &str = "tokenlogin.store.path";
/// Key holding the store PIN descriptor (`pin:`, `env:` or `file:`)
pub const STORE_PIN_KEY: &str = "tokenlogin.store.pin";

/// Where a configuration value was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    System,
    Security,
}

/// System and security configuration layers
#[derive(Debug, Default)]
pub struct ConfigLayers {
    system: Properties,
    security: Properties,
}

impl ConfigLayers {
    pub fn new(system: Properties, security: Properties) -> Self {
        Self { system, security }
    }

    /// Only a system layer
    pub fn system_only(system: Properties) -> Self {
        Self::new(system, Properties::new())
    }

    /// Only a security layer
    pub fn security_only(security: Properties) -> Self {
        Self::new(Properties::new(), security)
    }

    /// Look a key up across both layers
    pub fn lookup(&self, key: &str) -> Option<(&str, ConfigLayer)> {
        if let Some(value) = self.system.get(key) {
            return Some((value, ConfigLayer::System));
        }
        self.security
            .get(key)
            .filter(|value| !value.is_empty())
            .map(|value| (value, ConfigLayer::Security))
    }

    /// Configured store path, or [`StorePath::default`]
    pub fn store_path(&self) -> StorePath {
        match self.lookup(STORE_PATH_KEY) {
            Some((path, layer)) if !path.is_empty() => {
                debug!(?layer, path, "store path configured");
                StorePath::new(path)
            }
            _ => {
                debug!("store path not configured, using default");
                StorePath::default()
            }
        }
    }

    /// Raw store-PIN descriptor, if configured
    pub fn pin_descriptor(&self) -> Option<&str> {
        self.lookup(STORE_PIN_KEY).map(|(value, _)| value)
    }

    /// Resolve the store path and PIN
    pub fn resolve(&self, env: &dyn EnvSource) -> ResolvedCredentials {
        ResolvedCredentials {
            store_path: self.store_path(),
            resolution: resolve_descriptor(self.pin_descriptor(), env),
        }
    }
}

/// Store path and PIN resolution for one login attempt
#[derive(Debug)]
pub struct ResolvedCredentials {
    pub store_path: StorePath,
    pub resolution: Resolution,
}

impl ResolvedCredentials {
    pub fn new(store_path: StorePath, resolution: Resolution) -> Self {
        Self {
            store_path,
            resolution,
        }
    }

    pub fn pin_source(&self) -> PinSource {
        self.resolution.source()
    }
}
