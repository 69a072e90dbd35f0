// src/lookup/types.rs
//! Shared models for the provider fan-out: candidates, per-provider results,
//! the execution report, and the provider capability contract.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::normalize_search_query;
use crate::serving::{sanitize_per100, NutrientKind};

/// One provider's representation of a single food item.
///
/// `source` + `source_id` uniquely identify the candidate within its
/// provider; `provider_key` is the logical provider name used for
/// dedupe/priority lookups. Per-100 nutrient fields are `None` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFoodCandidate {
    pub source: String,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub calories_kcal_per_100: Option<f64>,
    #[serde(default)]
    pub protein_g_per_100: Option<f64>,
    #[serde(default)]
    pub carbs_g_per_100: Option<f64>,
    #[serde(default)]
    pub fat_g_per_100: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<String>,
}

impl RemoteFoodCandidate {
    /// Apply the nutrient bounds: non-finite, negative, or over-ceiling
    /// values (900 kcal, 100 g macros) drop to `None` — never clamped.
    pub fn sanitized(mut self) -> Self {
        self.calories_kcal_per_100 = self
            .calories_kcal_per_100
            .and_then(|v| sanitize_per100(v, NutrientKind::Calories));
        self.protein_g_per_100 = self
            .protein_g_per_100
            .and_then(|v| sanitize_per100(v, NutrientKind::Protein));
        self.carbs_g_per_100 = self
            .carbs_g_per_100
            .and_then(|v| sanitize_per100(v, NutrientKind::Carbs));
        self.fat_g_per_100 = self
            .fat_g_per_100
            .and_then(|v| sanitize_per100(v, NutrientKind::Fat));
        self
    }

    /// Count of populated nutrient fields, the richness measure used by
    /// reconciliation tie-breaking.
    pub fn populated_nutrient_count(&self) -> usize {
        [
            self.calories_kcal_per_100,
            self.protein_g_per_100,
            self.carbs_g_per_100,
            self.fat_g_per_100,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }

    /// Fill `provider_key` when the provider left it unset.
    pub fn with_provider_key(mut self, provider_id: &str) -> Self {
        if self.provider_key.is_none() {
            self.provider_key = Some(provider_id.to_string());
        }
        self
    }
}

/// What a provider can answer, and what a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderCapability {
    TextSearch,
    BarcodeLookup,
}

impl ProviderCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderCapability::TextSearch => "TEXT_SEARCH",
            ProviderCapability::BarcodeLookup => "BARCODE_LOOKUP",
        }
    }
}

impl ProviderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderStatus::Available => "AVAILABLE",
            ProviderStatus::Empty => "EMPTY",
            ProviderStatus::Timeout => "TIMEOUT",
            ProviderStatus::RateLimited => "RATE_LIMITED",
            ProviderStatus::Misconfigured => "MISCONFIGURED",
            ProviderStatus::GuardRejected => "GUARD_REJECTED",
            ProviderStatus::Error => "ERROR",
            ProviderStatus::UnsupportedCapability => "UNSUPPORTED_CAPABILITY",
            ProviderStatus::DisabledBySourceFilter => "DISABLED_BY_SOURCE_FILTER",
            ProviderStatus::DisabledBySettings => "DISABLED_BY_SETTINGS",
        }
    }
}

/// Classified outcome of one provider call (or of its pre-call screening).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Available,
    Empty,
    Timeout,
    RateLimited,
    Misconfigured,
    GuardRejected,
    Error,
    UnsupportedCapability,
    DisabledBySourceFilter,
    DisabledBySettings,
}

/// Provider-reported failure categories. These never escape the executor;
/// they are folded into a `ProviderStatus` on the result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderFailure {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
    #[error("guard rejected: {0}")]
    GuardRejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderFailure {
    pub fn status(&self) -> ProviderStatus {
        match self {
            ProviderFailure::RateLimited(_) => ProviderStatus::RateLimited,
            ProviderFailure::Misconfigured(_) => ProviderStatus::Misconfigured,
            ProviderFailure::GuardRejected(_) => ProviderStatus::GuardRejected,
            ProviderFailure::Transport(_) => ProviderStatus::Error,
        }
    }
}

/// Opaque capability proving a lookup was triggered by explicit user action.
/// Providers are never called without one.
#[derive(Debug, Clone)]
pub struct GuardToken {
    _user_action: (),
}

impl GuardToken {
    pub fn for_user_action() -> Self {
        Self { _user_action: () }
    }
}

/// The provider capability contract. Concrete network clients live outside
/// this crate; the executor only needs failures to surface as a
/// distinguishable `ProviderFailure` category.
#[async_trait::async_trait]
pub trait FoodDataProvider: Send + Sync {
    fn id(&self) -> &str;
    fn supports(&self, capability: ProviderCapability) -> bool;
    async fn search(
        &self,
        query: &str,
        guard: &GuardToken,
    ) -> Result<Vec<RemoteFoodCandidate>, ProviderFailure>;
    async fn lookup_barcode(
        &self,
        barcode: &str,
        guard: &GuardToken,
    ) -> Result<Option<RemoteFoodCandidate>, ProviderFailure>;
}

/// One result per eligible provider per request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider_id: String,
    pub capability: ProviderCapability,
    pub status: ProviderStatus,
    pub items: Vec<RemoteFoodCandidate>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit: u64,
    pub miss: u64,
}

/// Created once per search, never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderExecutionReport {
    pub request_type: ProviderCapability,
    pub source_filter: SourceFilter,
    pub merged_candidates: Vec<RemoteFoodCandidate>,
    pub provider_results: Vec<ProviderResult>,
    pub overall_elapsed_ms: u64,
    pub cache_stats: CacheStats,
    pub executed_at: DateTime<Utc>,
}

/// A search request carries exactly the input matching its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequest {
    Text { query: String },
    Barcode { barcode: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("text search requires a non-blank query")]
    BlankQuery,
    #[error("barcode lookup requires a non-blank barcode")]
    BlankBarcode,
}

impl SearchRequest {
    pub fn text(query: impl Into<String>) -> Result<Self, RequestError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(RequestError::BlankQuery);
        }
        Ok(SearchRequest::Text { query })
    }

    pub fn barcode(barcode: impl Into<String>) -> Result<Self, RequestError> {
        let barcode = barcode.into();
        if barcode.trim().is_empty() {
            return Err(RequestError::BlankBarcode);
        }
        Ok(SearchRequest::Barcode { barcode })
    }

    pub fn capability(&self) -> ProviderCapability {
        match self {
            SearchRequest::Text { .. } => ProviderCapability::TextSearch,
            SearchRequest::Barcode { .. } => ProviderCapability::BarcodeLookup,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            SearchRequest::Text { query } => query,
            SearchRequest::Barcode { barcode } => barcode,
        }
    }

    /// Cache-key input form: the raw input run through text normalization
    /// (barcodes are trimmed by construction, then normalized verbatim).
    pub fn normalized_input(&self) -> String {
        normalize_search_query(self.input())
    }
}

/// Which providers a request may touch. Empty filter = all providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter(Option<BTreeSet<String>>);

impl SourceFilter {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(ids.into_iter().map(Into::into).collect()))
    }

    pub fn allows(&self, provider_id: &str) -> bool {
        match &self.0 {
            None => true,
            Some(ids) => ids.contains(provider_id),
        }
    }
}

/// User settings relevant to lookups. Online lookups can be switched off
/// entirely, in which case every provider reports `DISABLED_BY_SETTINGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSettings {
    #[serde(default = "default_online_lookup_enabled")]
    pub online_lookup_enabled: bool,
}

fn default_online_lookup_enabled() -> bool {
    true
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            online_lookup_enabled: true,
        }
    }
}

/// Cache interaction mode for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachePolicy {
    CachePreferred,
    ForceRefresh,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::CachePreferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> RemoteFoodCandidate {
        RemoteFoodCandidate {
            source: "openfoodfacts".into(),
            source_id: "123".into(),
            provider_key: None,
            barcode: None,
            name: "Oat Drink".into(),
            brand: Some("Oatly".into()),
            calories_kcal_per_100: Some(46.0),
            protein_g_per_100: Some(1.0),
            carbs_g_per_100: Some(6.7),
            fat_g_per_100: Some(1.5),
            serving_size: Some("250 ml".into()),
        }
    }

    #[test]
    fn sanitized_drops_out_of_bounds_to_none() {
        let mut c = candidate();
        c.calories_kcal_per_100 = Some(1200.0); // above 900 ceiling
        c.protein_g_per_100 = Some(-3.0);
        c.carbs_g_per_100 = Some(f64::INFINITY);
        let s = c.sanitized();
        assert_eq!(s.calories_kcal_per_100, None);
        assert_eq!(s.protein_g_per_100, None);
        assert_eq!(s.carbs_g_per_100, None);
        assert_eq!(s.fat_g_per_100, Some(1.5));
    }

    #[test]
    fn populated_nutrient_count_counts_non_null() {
        let mut c = candidate();
        assert_eq!(c.populated_nutrient_count(), 4);
        c.protein_g_per_100 = None;
        c.fat_g_per_100 = None;
        assert_eq!(c.populated_nutrient_count(), 2);
    }

    #[test]
    fn blank_request_inputs_are_rejected() {
        assert_eq!(SearchRequest::text("  "), Err(RequestError::BlankQuery));
        assert_eq!(SearchRequest::barcode(""), Err(RequestError::BlankBarcode));
        assert!(SearchRequest::text("oat milk").is_ok());
    }

    #[test]
    fn source_filter_allows_by_membership() {
        let f = SourceFilter::only(["usda"]);
        assert!(f.allows("usda"));
        assert!(!f.allows("openfoodfacts"));
        assert!(SourceFilter::all().allows("anything"));
    }

    #[test]
    fn provider_failure_maps_to_status() {
        assert_eq!(
            ProviderFailure::RateLimited("429".into()).status(),
            ProviderStatus::RateLimited
        );
        assert_eq!(
            ProviderFailure::Transport("conn reset".into()).status(),
            ProviderStatus::Error
        );
    }
}
