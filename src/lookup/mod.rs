// src/lookup/mod.rs
//! Concurrent provider fan-out under timeout and cache policy.
//!
//! One task per eligible provider per search, each bounded by the
//! per-provider timeout, the whole operation bounded by the overall
//! timeout. Stragglers are abandoned at the overall deadline: they are
//! cancelled rather than awaited, and a late completion can never reach the
//! already-assembled report. The only cross-search state is the sharded
//! result cache.

pub mod cache;
pub mod config;
pub mod providers;
pub mod types;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tokio::task::JoinSet;

use crate::lookup::cache::{Clock, ProviderResultCache, SystemClock};
use crate::lookup::types::{
    CachePolicy, CacheStats, FoodDataProvider, GuardToken, LookupSettings, ProviderCapability,
    ProviderExecutionReport, ProviderFailure, ProviderResult, ProviderStatus, RemoteFoodCandidate,
    SearchRequest, SourceFilter,
};
use crate::query::normalize_search_query;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("lookup_requests_total", "Search executions started.");
        describe_counter!(
            "lookup_provider_status_total",
            "Provider results by final status."
        );
        describe_counter!("lookup_cache_hits_total", "Provider-result cache hits.");
        describe_counter!("lookup_cache_misses_total", "Provider-result cache misses.");
        describe_counter!(
            "lookup_overall_deadline_total",
            "Executions that hit the overall deadline with stragglers outstanding."
        );
        describe_histogram!(
            "lookup_provider_elapsed_ms",
            "Per-provider call time in milliseconds."
        );
        describe_histogram!("lookup_overall_ms", "Whole fan-out time in milliseconds.");
    });
}

/// Short anonymized id for logging: queries are user input and never appear
/// in logs verbatim.
fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Timeout/cache policy for the executor. Invalid combinations are
/// configuration errors and fail construction immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorPolicy {
    pub overall_timeout: Duration,
    pub per_provider_timeout: Duration,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("overall timeout must be positive")]
    NonPositiveOverallTimeout,
    #[error("per-provider timeout must be positive")]
    NonPositivePerProviderTimeout,
    #[error("overall timeout {overall:?} must not be shorter than per-provider timeout {per_provider:?}")]
    TimeoutOrdering {
        overall: Duration,
        per_provider: Duration,
    },
    #[error("cache ttl must be positive")]
    NonPositiveCacheTtl,
}

impl ExecutorPolicy {
    pub fn new(
        overall_timeout: Duration,
        per_provider_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, PolicyError> {
        if overall_timeout.is_zero() {
            return Err(PolicyError::NonPositiveOverallTimeout);
        }
        if per_provider_timeout.is_zero() {
            return Err(PolicyError::NonPositivePerProviderTimeout);
        }
        if overall_timeout < per_provider_timeout {
            return Err(PolicyError::TimeoutOrdering {
                overall: overall_timeout,
                per_provider: per_provider_timeout,
            });
        }
        if cache_ttl.is_zero() {
            return Err(PolicyError::NonPositiveCacheTtl);
        }
        Ok(Self {
            overall_timeout,
            per_provider_timeout,
            cache_ttl,
        })
    }
}

/// Per-execution knobs. The guard token is required before any provider
/// call; without one every provider that would need the network reports
/// `GUARD_REJECTED`.
#[derive(Clone, Default)]
pub struct ExecutionOptions {
    pub source_filter: SourceFilter,
    pub settings: LookupSettings,
    pub cache_policy: CachePolicy,
    pub guard: Option<GuardToken>,
}

/// Orchestrates concurrent calls into registered providers.
pub struct ProviderExecutor {
    providers: Vec<Arc<dyn FoodDataProvider>>,
    policy: ExecutorPolicy,
    cache: Arc<ProviderResultCache>,
    clock: Arc<dyn Clock>,
}

impl ProviderExecutor {
    pub fn new(policy: ExecutorPolicy) -> Self {
        Self::with_parts(policy, Arc::new(ProviderResultCache::new()), Arc::new(SystemClock))
    }

    /// Construct with an injected cache and clock (deterministic in tests,
    /// shareable across executors in production).
    pub fn with_parts(
        policy: ExecutorPolicy,
        cache: Arc<ProviderResultCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers: Vec::new(),
            policy,
            cache,
            clock,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn FoodDataProvider>) {
        self.providers.push(provider);
    }

    pub fn policy(&self) -> &ExecutorPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<ProviderResultCache> {
        &self.cache
    }

    /// Run one search across all eligible providers. Always returns a
    /// report, even when every provider fails.
    pub async fn execute(
        &self,
        request: &SearchRequest,
        opts: &ExecutionOptions,
    ) -> ProviderExecutionReport {
        ensure_metrics_described();
        counter!("lookup_requests_total").increment(1);

        let started = Instant::now();
        let executed_at = self.clock.now();
        let capability = request.capability();
        let normalized_input = request.normalized_input();

        let mut results: Vec<ProviderResult> = Vec::new();
        let mut cache_stats = CacheStats::default();
        let mut eligible: Vec<(String, Arc<dyn FoodDataProvider>, String)> = Vec::new();

        for provider in &self.providers {
            let id = provider.id().to_string();
            if !provider.supports(capability) {
                results.push(precall_result(&id, capability, ProviderStatus::UnsupportedCapability));
                continue;
            }
            if !opts.source_filter.allows(&id) {
                results.push(precall_result(
                    &id,
                    capability,
                    ProviderStatus::DisabledBySourceFilter,
                ));
                continue;
            }
            if !opts.settings.online_lookup_enabled {
                results.push(precall_result(&id, capability, ProviderStatus::DisabledBySettings));
                continue;
            }

            let key = cache_key(&id, capability, &normalized_input);
            if opts.cache_policy == CachePolicy::CachePreferred {
                if let Some(hit) = self.cache.get(&key, executed_at) {
                    counter!("lookup_cache_hits_total").increment(1);
                    cache_stats.hit += 1;
                    results.push(hit);
                    continue;
                }
                counter!("lookup_cache_misses_total").increment(1);
                cache_stats.miss += 1;
            } else {
                // FORCE_REFRESH skips the read but still counts as a miss.
                counter!("lookup_cache_misses_total").increment(1);
                cache_stats.miss += 1;
            }

            if opts.guard.is_none() {
                results.push(precall_result(&id, capability, ProviderStatus::GuardRejected));
                continue;
            }

            eligible.push((id, Arc::clone(provider), key));
        }

        let mut outstanding: BTreeSet<String> =
            eligible.iter().map(|(id, _, _)| id.clone()).collect();
        let spawned = eligible.len();

        let mut join: JoinSet<(String, String, ProviderResult)> = JoinSet::new();
        let mut task_owner: HashMap<tokio::task::Id, String> = HashMap::new();
        if let Some(guard) = opts.guard.clone() {
            for (id, provider, key) in eligible {
                let request = request.clone();
                let guard = guard.clone();
                let per_timeout = self.policy.per_provider_timeout;
                let owner = id.clone();
                let handle = join.spawn(async move {
                    let t0 = Instant::now();
                    let outcome = tokio::time::timeout(
                        per_timeout,
                        call_provider(provider.as_ref(), &request, &guard),
                    )
                    .await;
                    let elapsed_ms = t0.elapsed().as_millis() as u64;
                    let result = classify_outcome(&id, capability, outcome, elapsed_ms);
                    (id, key, result)
                });
                task_owner.insert(handle.id(), owner);
            }
        }

        let deadline = tokio::time::Instant::now() + self.policy.overall_timeout;
        let mut received = 0usize;
        while received < spawned {
            match tokio::time::timeout_at(deadline, join.join_next()).await {
                Ok(Some(Ok((id, key, result)))) => {
                    received += 1;
                    outstanding.remove(&id);
                    if matches!(result.status, ProviderStatus::Available | ProviderStatus::Empty) {
                        self.cache
                            .put(&key, &result, self.policy.cache_ttl, self.clock.now());
                    }
                    if result.status != ProviderStatus::Available {
                        tracing::warn!(
                            target: "lookup",
                            provider = %result.provider_id,
                            status = result.status.as_str(),
                            diagnostics = result.diagnostics.as_deref().unwrap_or(""),
                            "provider finished without items"
                        );
                    }
                    histogram!("lookup_provider_elapsed_ms").record(result.elapsed_ms as f64);
                    results.push(result);
                }
                Ok(Some(Err(join_err))) => {
                    received += 1;
                    if let Some(provider_id) = task_owner.get(&join_err.id()).cloned() {
                        outstanding.remove(&provider_id);
                        tracing::warn!(
                            target: "lookup",
                            provider = %provider_id,
                            error = ?join_err,
                            "provider task failed to join"
                        );
                        results.push(ProviderResult {
                            provider_id,
                            capability,
                            status: ProviderStatus::Error,
                            items: vec![],
                            elapsed_ms: started.elapsed().as_millis() as u64,
                            diagnostics: Some(join_err.to_string()),
                            from_cache: false,
                        });
                    } else {
                        tracing::warn!(target: "lookup", error = ?join_err, "provider task failed to join");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    counter!("lookup_overall_deadline_total").increment(1);
                    break;
                }
            }
        }

        // Abandon stragglers: cancel rather than wait, and record them as
        // timed out. Dropping the join set below drops any late output.
        join.abort_all();
        let overall_elapsed_ms = started.elapsed().as_millis() as u64;
        for id in outstanding {
            results.push(ProviderResult {
                provider_id: id,
                capability,
                status: ProviderStatus::Timeout,
                items: vec![],
                elapsed_ms: overall_elapsed_ms,
                diagnostics: Some("outstanding at overall deadline".into()),
                from_cache: false,
            });
        }

        results.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        for r in &results {
            counter!("lookup_provider_status_total", "status" => r.status.as_str()).increment(1);
        }

        let merged_candidates: Vec<RemoteFoodCandidate> = results
            .iter()
            .filter(|r| r.status == ProviderStatus::Available)
            .flat_map(|r| r.items.iter().cloned())
            .collect();

        histogram!("lookup_overall_ms").record(overall_elapsed_ms as f64);
        tracing::info!(
            target: "lookup",
            request = %anon_hash(&normalized_input),
            request_type = capability.as_str(),
            providers = results.len(),
            merged = merged_candidates.len(),
            cache_hits = cache_stats.hit,
            cache_misses = cache_stats.miss,
            overall_ms = overall_elapsed_ms,
            "provider fan-out finished"
        );

        ProviderExecutionReport {
            request_type: capability,
            source_filter: opts.source_filter.clone(),
            merged_candidates,
            provider_results: results,
            overall_elapsed_ms,
            cache_stats,
            executed_at,
        }
    }
}

/// Cache key: `normalize(providerId) | requestType | normalize(input)`.
pub(crate) fn cache_key(
    provider_id: &str,
    capability: ProviderCapability,
    normalized_input: &str,
) -> String {
    format!(
        "{}|{}|{}",
        normalize_search_query(provider_id),
        capability.as_str(),
        normalized_input
    )
}

fn precall_result(
    provider_id: &str,
    capability: ProviderCapability,
    status: ProviderStatus,
) -> ProviderResult {
    ProviderResult {
        provider_id: provider_id.to_string(),
        capability,
        status,
        items: vec![],
        elapsed_ms: 0,
        diagnostics: None,
        from_cache: false,
    }
}

async fn call_provider(
    provider: &dyn FoodDataProvider,
    request: &SearchRequest,
    guard: &GuardToken,
) -> Result<Vec<RemoteFoodCandidate>, ProviderFailure> {
    match request {
        SearchRequest::Text { query } => provider.search(query, guard).await,
        SearchRequest::Barcode { barcode } => Ok(provider
            .lookup_barcode(barcode, guard)
            .await?
            .into_iter()
            .collect()),
    }
}

fn classify_outcome(
    provider_id: &str,
    capability: ProviderCapability,
    outcome: Result<Result<Vec<RemoteFoodCandidate>, ProviderFailure>, tokio::time::error::Elapsed>,
    elapsed_ms: u64,
) -> ProviderResult {
    match outcome {
        Ok(Ok(items)) => {
            let items: Vec<RemoteFoodCandidate> = items
                .into_iter()
                .map(|c| c.sanitized().with_provider_key(provider_id))
                .collect();
            let status = if items.is_empty() {
                ProviderStatus::Empty
            } else {
                ProviderStatus::Available
            };
            ProviderResult {
                provider_id: provider_id.to_string(),
                capability,
                status,
                items,
                elapsed_ms,
                diagnostics: None,
                from_cache: false,
            }
        }
        Ok(Err(failure)) => ProviderResult {
            provider_id: provider_id.to_string(),
            capability,
            status: failure.status(),
            items: vec![],
            elapsed_ms,
            diagnostics: Some(failure.to_string()),
            from_cache: false,
        },
        Err(_) => ProviderResult {
            provider_id: provider_id.to_string(),
            capability,
            status: ProviderStatus::Timeout,
            items: vec![],
            elapsed_ms,
            diagnostics: Some("per-provider deadline elapsed".into()),
            from_cache: false,
        },
    }
}
