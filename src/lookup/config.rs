// src/lookup/config.rs
//! Search configuration: executor timeout/cache policy, provider priority
//! ranks for reconciliation tie-breaks, and lookup settings.
//!
//! Loaded from TOML (`config/search.toml` by default, overridable via
//! `SEARCH_CONFIG_PATH`); individual policy values can additionally be
//! overridden from the environment.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::lookup::{ExecutorPolicy, PolicyError};
use crate::lookup::types::LookupSettings;

pub const DEFAULT_SEARCH_CONFIG_PATH: &str = "config/search.toml";
pub const ENV_SEARCH_CONFIG_PATH: &str = "SEARCH_CONFIG_PATH";
pub const ENV_OVERALL_TIMEOUT_MS: &str = "SEARCH_OVERALL_TIMEOUT_MS";
pub const ENV_PER_PROVIDER_TIMEOUT_MS: &str = "SEARCH_PER_PROVIDER_TIMEOUT_MS";
pub const ENV_CACHE_TTL_SECS: &str = "SEARCH_CACHE_TTL_SECS";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub policy: PolicySection,
    /// providerId → rank; lower rank = more preferred. Used only for
    /// reconciliation tie-breaking, never as primary order.
    #[serde(default)]
    pub priorities: HashMap<String, u32>,
    #[serde(default)]
    pub settings: LookupSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    #[serde(default = "default_per_provider_timeout_ms")]
    pub per_provider_timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_overall_timeout_ms() -> u64 {
    6_000
}
fn default_per_provider_timeout_ms() -> u64 {
    2_500
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            overall_timeout_ms: default_overall_timeout_ms(),
            per_provider_timeout_ms: default_per_provider_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            policy: PolicySection::default(),
            priorities: HashMap::new(),
            settings: LookupSettings::default(),
        }
    }
}

impl SearchConfig {
    /// Load using env var + fallbacks:
    /// 1) $SEARCH_CONFIG_PATH
    /// 2) config/search.toml
    /// 3) built-in defaults (missing file is not an error)
    ///
    /// Env overrides for individual policy values are applied last.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_SEARCH_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SEARCH_CONFIG_PATH));

        let mut cfg = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading search config at {}", path.display()))?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        if let Some(v) = parse_env_u64(ENV_OVERALL_TIMEOUT_MS) {
            cfg.policy.overall_timeout_ms = v;
        }
        if let Some(v) = parse_env_u64(ENV_PER_PROVIDER_TIMEOUT_MS) {
            cfg.policy.per_provider_timeout_ms = v;
        }
        if let Some(v) = parse_env_u64(ENV_CACHE_TTL_SECS) {
            cfg.policy.cache_ttl_secs = v;
        }

        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("parsing search config TOML")
    }

    /// Validate the policy section into an `ExecutorPolicy`. Invalid
    /// orderings fail loudly; they are configuration errors.
    pub fn executor_policy(&self) -> Result<ExecutorPolicy, PolicyError> {
        ExecutorPolicy::new(
            Duration::from_millis(self.policy.overall_timeout_ms),
            Duration::from_millis(self.policy.per_provider_timeout_ms),
            Duration::from_secs(self.policy.cache_ttl_secs),
        )
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
