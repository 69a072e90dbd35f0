// tests/lookup_cache.rs
//
// Cache behavior of the provider executor, driven by an injected test clock:
// second identical search is served from cache without touching the
// provider, TTL expiry forces a refresh, FORCE_REFRESH bypasses the read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use food_search_reconciler::lookup::cache::{Clock, ProviderResultCache};
use food_search_reconciler::lookup::types::{
    CachePolicy, FoodDataProvider, GuardToken, LookupSettings, ProviderCapability, ProviderFailure,
    ProviderStatus, RemoteFoodCandidate, SearchRequest, SourceFilter,
};
use food_search_reconciler::lookup::{ExecutionOptions, ExecutorPolicy, ProviderExecutor};

struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    fn at(secs: i64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
        })
    }

    fn advance_secs(&self, secs: i64) {
        let mut guard = self.now.lock().unwrap();
        *guard += chrono::Duration::seconds(secs);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Counts real calls so cache hits are observable.
struct CountingProvider {
    id: String,
    calls: AtomicU64,
}

impl CountingProvider {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn candidate(&self) -> RemoteFoodCandidate {
        RemoteFoodCandidate {
            source: self.id.clone(),
            source_id: "1".into(),
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
}

#[async_trait::async_trait]
impl FoodDataProvider for CountingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, _capability: ProviderCapability) -> bool {
        true
    }

    async fn search(
        &self,
        _query: &str,
        _guard: &GuardToken,
    ) -> Result<Vec<RemoteFoodCandidate>, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.candidate()])
    }

    async fn lookup_barcode(
        &self,
        _barcode: &str,
        _guard: &GuardToken,
    ) -> Result<Option<RemoteFoodCandidate>, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.candidate()))
    }
}

fn policy() -> ExecutorPolicy {
    ExecutorPolicy::new(
        Duration::from_secs(5),
        Duration::from_secs(2),
        Duration::from_secs(300),
    )
    .expect("valid policy")
}

fn executor_with(
    provider: Arc<CountingProvider>,
    clock: Arc<TestClock>,
) -> ProviderExecutor {
    let mut executor =
        ProviderExecutor::with_parts(policy(), Arc::new(ProviderResultCache::new()), clock);
    executor.register(provider);
    executor
}

fn user_opts() -> ExecutionOptions {
    ExecutionOptions {
        source_filter: SourceFilter::all(),
        settings: LookupSettings::default(),
        cache_policy: CachePolicy::CachePreferred,
        guard: Some(GuardToken::for_user_action()),
    }
}

#[tokio::test]
async fn second_identical_search_is_served_from_cache() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), Arc::clone(&clock));
    let request = SearchRequest::text("oat drink").expect("request");

    let first = executor.execute(&request, &user_opts()).await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(first.cache_stats.miss, 1);
    assert_eq!(first.cache_stats.hit, 0);
    assert!(!first.provider_results[0].from_cache);

    let second = executor.execute(&request, &user_opts()).await;
    assert_eq!(provider.calls(), 1, "cache hit must not call the provider");
    assert_eq!(second.cache_stats.hit, 1);
    assert_eq!(second.cache_stats.miss, 0);
    assert!(second.provider_results[0].from_cache);
    assert_eq!(second.merged_candidates.len(), 1);
}

#[tokio::test]
async fn equivalent_queries_share_a_cache_entry() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), clock);

    let a = SearchRequest::text("Coke-Zero 330ml").expect("request");
    let b = SearchRequest::text("coke zero 330 ml").expect("request");
    executor.execute(&a, &user_opts()).await;
    let report = executor.execute(&b, &user_opts()).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(report.cache_stats.hit, 1);
}

#[tokio::test]
async fn ttl_expiry_forces_a_fresh_call() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), Arc::clone(&clock));
    let request = SearchRequest::text("oat drink").expect("request");

    executor.execute(&request, &user_opts()).await;
    clock.advance_secs(301); // past the 300 s ttl

    let report = executor.execute(&request, &user_opts()).await;
    assert_eq!(provider.calls(), 2);
    assert_eq!(report.cache_stats.miss, 1);
}

#[tokio::test]
async fn force_refresh_bypasses_the_cache_read() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), clock);
    let request = SearchRequest::text("oat drink").expect("request");

    executor.execute(&request, &user_opts()).await;

    let opts = ExecutionOptions {
        cache_policy: CachePolicy::ForceRefresh,
        ..user_opts()
    };
    let report = executor.execute(&request, &opts).await;
    assert_eq!(provider.calls(), 2, "force refresh must call the provider");
    assert_eq!(report.cache_stats.miss, 1);
    assert_eq!(report.cache_stats.hit, 0);
}

#[tokio::test]
async fn missing_guard_token_never_reaches_the_provider() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), clock);
    let request = SearchRequest::text("oat drink").expect("request");

    let opts = ExecutionOptions {
        guard: None,
        ..user_opts()
    };
    let report = executor.execute(&request, &opts).await;
    assert_eq!(provider.calls(), 0);
    assert_eq!(report.provider_results[0].status, ProviderStatus::GuardRejected);
    assert!(report.merged_candidates.is_empty());
}

#[tokio::test]
async fn cache_hit_requires_no_guard_token() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), clock);
    let request = SearchRequest::text("oat drink").expect("request");

    executor.execute(&request, &user_opts()).await;

    let opts = ExecutionOptions {
        guard: None,
        ..user_opts()
    };
    let report = executor.execute(&request, &opts).await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(report.cache_stats.hit, 1);
    assert!(report.provider_results[0].from_cache);
}

#[tokio::test]
async fn disabled_settings_and_source_filter_screen_before_cache() {
    let provider = CountingProvider::new("usda");
    let clock = TestClock::at(1_000);
    let executor = executor_with(Arc::clone(&provider), clock);
    let request = SearchRequest::text("oat drink").expect("request");

    let opts = ExecutionOptions {
        settings: LookupSettings {
            online_lookup_enabled: false,
        },
        ..user_opts()
    };
    let report = executor.execute(&request, &opts).await;
    assert_eq!(report.provider_results[0].status, ProviderStatus::DisabledBySettings);

    let opts = ExecutionOptions {
        source_filter: SourceFilter::only(["openfoodfacts"]),
        ..user_opts()
    };
    let report = executor.execute(&request, &opts).await;
    assert_eq!(
        report.provider_results[0].status,
        ProviderStatus::DisabledBySourceFilter
    );
    assert_eq!(provider.calls(), 0);
    assert_eq!(report.cache_stats.hit + report.cache_stats.miss, 0);
}
