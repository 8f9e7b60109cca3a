//! Runtime configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, RegistryError};
use crate::slots::SlotRegistry;

pub const BASE_URL_VAR: &str = "RULE_ATTACH_BASE_URL";
pub const TOKEN_VAR: &str = "RULE_ATTACH_TOKEN";
pub const TIMEOUT_VAR: &str = "RULE_ATTACH_TIMEOUT_SECS";
pub const SLOTS_FILE_VAR: &str = "RULE_ATTACH_SLOTS_FILE";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct RuleAttachConfig {
    /// API root; always ends with `/` so relative joins keep its path
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Slot registry override; the built-in registry is used when unset
    pub slots_file: Option<PathBuf>,
}

impl RuleAttachConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let raw_url = get(BASE_URL_VAR).ok_or(ConfigError::Missing(BASE_URL_VAR))?;
        let base_url = parse_base_url(&raw_url)?;

        let timeout = match get(TIMEOUT_VAR) {
            Some(secs) => {
                let secs: u64 = secs.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: TIMEOUT_VAR,
                    reason: format!("'{secs}' is not a whole number of seconds"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        var: TIMEOUT_VAR,
                        reason: "must be greater than zero".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let config = Self {
            base_url,
            token: get(TOKEN_VAR),
            timeout,
            slots_file: get(SLOTS_FILE_VAR).map(PathBuf::from),
        };
        debug!(
            "Config: base_url={} timeout={:?} token={}",
            config.base_url,
            config.timeout,
            if config.token.is_some() { "set" } else { "unset" }
        );
        Ok(config)
    }

    /// Load the configured slot registry
    pub fn registry(&self) -> Result<SlotRegistry, RegistryError> {
        match &self.slots_file {
            Some(path) => SlotRegistry::load(path),
            None => SlotRegistry::builtin(),
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        var: BASE_URL_VAR,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: BASE_URL_VAR,
            reason: format!("'{raw}' is not an http(s) URL"),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
