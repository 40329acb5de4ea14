// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous map configuration.
//!
//! Sources in priority order (lowest to highest):
//! 1. Code defaults
//! 2. TOML file named by `RENDEZVOUS_CONFIG_PATH`
//! 3. Environment variables (`RENDEZVOUS_*` prefixed)
//! 4. Programmatic providers merged through [`RendezvousConfig::figment_with`]

use derive_builder::Builder;
use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Json, Serialized, Toml},
    value::{Dict, Map},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

const CONFIG_PATH_ENV: &str = "RENDEZVOUS_CONFIG_PATH";
const ENV_PREFIX: &str = "RENDEZVOUS_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to extract configuration.
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Runtime settings of a [`RendezvousMap`](crate::RendezvousMap).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, Builder)]
#[builder(pattern = "owned", default)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Label recorded on every log line emitted for this map.
    #[validate(length(min = 1))]
    #[builder(setter(into))]
    pub name: String,

    /// Age after which an unmatched entry is evicted. 0 disables eviction.
    pub stale_item_ttl_ms: u64,

    /// Period of the eviction sweep. None = run once per TTL.
    #[validate(range(min = 1))]
    #[builder(setter(strip_option))]
    pub sweep_interval_ms: Option<u64>,

    /// Fail a parked waiter with `Expired` when its entry is evicted.
    /// When false the waiter stays parked until it is cancelled.
    pub cancel_evicted: bool,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            name: "rendezvous".to_string(),
            stale_item_ttl_ms: 0,
            sweep_interval_ms: None,
            cancel_evicted: true,
        }
    }
}

impl RendezvousConfig {
    /// Start a [`RendezvousConfigBuilder`] seeded with defaults.
    pub fn builder() -> RendezvousConfigBuilder {
        RendezvousConfigBuilder::default()
    }

    /// Eviction TTL, or `None` when eviction is disabled.
    pub fn stale_item_ttl(&self) -> Option<Duration> {
        (self.stale_item_ttl_ms > 0).then(|| Duration::from_millis(self.stale_item_ttl_ms))
    }

    /// Period of the eviction sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.unwrap_or(self.stale_item_ttl_ms).max(1))
    }

    /// Create a Figment configuration with all sources merged.
    pub fn figment() -> Figment {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();

        Figment::new()
            .merge(Serialized::defaults(RendezvousConfig::default()))
            .merge(Toml::file(&config_path))
            // RENDEZVOUS_STALE_ITEM_TTL_MS, RENDEZVOUS_SWEEP_INTERVAL_MS, ...
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config_path"]))
    }

    /// Load configuration from default figment (env and files).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract and validate configuration from any provider.
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a figment from defaults, then merge a custom provider.
    ///
    /// # Example
    /// ```rust,ignore
    /// let figment = RendezvousConfig::figment_with(("stale_item_ttl_ms", 30_000u64));
    /// let config = RendezvousConfig::extract_from(figment)?;
    /// ```
    pub fn figment_with<T: Provider>(extra: T) -> Figment {
        Self::figment().merge(extra)
    }

    /// Load configuration with JSON overrides on top of every other source.
    pub fn from_figment_with_json(json: &str) -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment().merge(Json::string(json)))
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Provider for RendezvousConfig {
    fn metadata(&self) -> Metadata {
        Metadata::named("RendezvousConfig")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
