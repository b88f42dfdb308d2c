//! Provider configuration
//!
//! Settings come from `ARM_*` environment variables; command-line flags
//! override individual values afterwards.

use std::time::Duration;

use thiserror::Error;
use vela_core::lifecycle::Account;

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set (environment variable or command-line flag)")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Connection settings for Azure Resource Manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub access_token: String,
    pub endpoint: String,
    /// Delay between polls of a long-running operation when the API gives no Retry-After
    pub poll_interval: Duration,
}

/// Values gathered before validation, one per setting
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: Option<String>,
    pub poll_interval: Option<Duration>,
}

impl ProviderConfig {
    /// Load from the process environment, then apply overrides
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load(|name| std::env::var(name).ok(), overrides)
    }

    /// Load using an arbitrary variable lookup
    pub fn load(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let poll_interval = match overrides.poll_interval {
            Some(interval) => interval,
            None => match var("ARM_POLL_INTERVAL") {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::Invalid {
                        name: "ARM_POLL_INTERVAL",
                        message: e.to_string(),
                    })?,
                None => DEFAULT_POLL_INTERVAL,
            },
        };

        let endpoint = overrides
            .endpoint
            .or_else(|| var("ARM_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid {
                name: "ARM_ENDPOINT",
                message: format!("{:?} is not an http(s) URL", endpoint),
            });
        }

        Ok(Self {
            subscription_id: overrides
                .subscription_id
                .or_else(|| var("ARM_SUBSCRIPTION_ID"))
                .ok_or(ConfigError::Missing("ARM_SUBSCRIPTION_ID"))?,
            tenant_id: overrides.tenant_id.or_else(|| var("ARM_TENANT_ID")),
            access_token: overrides
                .access_token
                .or_else(|| var("ARM_ACCESS_TOKEN"))
                .ok_or(ConfigError::Missing("ARM_ACCESS_TOKEN"))?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            poll_interval,
        })
    }

    pub fn account(&self) -> Account {
        Account {
            subscription_id: self.subscription_id.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}
