//! Name resolution backed by host settings.

use std::collections::BTreeMap;

use weld_core::NameResolver;

use crate::config::HostSettings;

/// Resolves `%token%` names from `host.settings`, then from the environment.
///
/// Settings loaded from `WELD_HOST__SETTINGS__*` variables arrive with
/// lowercased keys, so a miss on the exact name retries in lowercase.
#[derive(Debug, Clone, Default)]
pub struct SettingsNameResolver {
    settings: BTreeMap<String, String>,
    env_fallback: bool,
    env_prefix: Option<String>,
}

impl SettingsNameResolver {
    pub fn new(host: &HostSettings) -> Self {
        Self {
            settings: host.settings.clone(),
            env_fallback: host.name_resolution.env_fallback,
            env_prefix: host.name_resolution.env_prefix.clone(),
        }
    }

    /// Returns the number of configured settings.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    fn from_env(&self, name: &str) -> Option<String> {
        match &self.env_prefix {
            Some(prefix) => std::env::var(format!("{prefix}{name}")).ok(),
            None => std::env::var(name).ok(),
        }
    }
}

impl NameResolver for SettingsNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.settings
            .get(name)
            .or_else(|| self.settings.get(&name.to_lowercase()))
            .cloned()
            .or_else(|| self.env_fallback.then(|| self.from_env(name)).flatten())
    }
}
