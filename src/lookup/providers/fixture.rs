// src/lookup/providers/fixture.rs
//! Catalog-backed provider over an embedded JSON fixture.
//!
//! The concrete network clients for the real catalogs live outside this
//! crate; this provider implements the same capability contract over a
//! static candidate list, which is what the demo binary and the
//! integration tests run against. Latency and failure injection exist so
//! timeout and error classification paths can be exercised deterministically.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::lookup::types::{
    FoodDataProvider, GuardToken, ProviderCapability, ProviderFailure, RemoteFoodCandidate,
};
use crate::query::normalize_search_query;

pub struct FixtureProvider {
    id: String,
    capabilities: Vec<ProviderCapability>,
    catalog: Vec<RemoteFoodCandidate>,
    latency: Option<Duration>,
    fail_with: Option<ProviderFailure>,
}

impl FixtureProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: vec![
                ProviderCapability::TextSearch,
                ProviderCapability::BarcodeLookup,
            ],
            catalog: Vec::new(),
            latency: None,
            fail_with: None,
        }
    }

    /// Parse an embedded JSON catalog (array of candidates).
    pub fn from_catalog_json(id: impl Into<String>, json: &str) -> Result<Self> {
        let id = id.into();
        let catalog: Vec<RemoteFoodCandidate> = serde_json::from_str(json)
            .with_context(|| format!("parsing fixture catalog for provider `{id}`"))?;
        Ok(Self::new(id).with_candidates(catalog))
    }

    pub fn with_candidates(mut self, catalog: Vec<RemoteFoodCandidate>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<ProviderCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Delay every call by `latency` (drives timeout tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call with the given category.
    pub fn failing_with(mut self, failure: ProviderFailure) -> Self {
        self.fail_with = Some(failure);
        self
    }

    async fn simulate_call(&self) -> Result<(), ProviderFailure> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.fail_with {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    fn matches_query(candidate: &RemoteFoodCandidate, normalized_query: &str) -> bool {
        let haystack = normalize_search_query(&format!(
            "{} {}",
            candidate.name,
            candidate.brand.as_deref().unwrap_or_default()
        ));
        normalized_query
            .split(' ')
            .filter(|t| !t.is_empty())
            .all(|token| haystack.contains(token))
    }
}

#[async_trait::async_trait]
impl FoodDataProvider for FixtureProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    async fn search(
        &self,
        query: &str,
        _guard: &GuardToken,
    ) -> Result<Vec<RemoteFoodCandidate>, ProviderFailure> {
        self.simulate_call().await?;
        let normalized = normalize_search_query(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .catalog
            .iter()
            .filter(|c| Self::matches_query(c, &normalized))
            .cloned()
            .collect())
    }

    async fn lookup_barcode(
        &self,
        barcode: &str,
        _guard: &GuardToken,
    ) -> Result<Option<RemoteFoodCandidate>, ProviderFailure> {
        self.simulate_call().await?;
        let wanted = barcode.trim();
        Ok(self
            .catalog
            .iter()
            .find(|c| c.barcode.as_deref().map(str::trim) == Some(wanted))
            .cloned())
    }
}
