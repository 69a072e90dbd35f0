//! Food search reconciliation service — binary entrypoint.
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use food_search_reconciler::api::{create_router, AppState};
use food_search_reconciler::lookup::config::SearchConfig;
use food_search_reconciler::lookup::providers::FixtureProvider;
use food_search_reconciler::lookup::ProviderExecutor;
use food_search_reconciler::metrics::Metrics;
use food_search_reconciler::trust::ProvenanceRegistry;

const DEFAULT_PORT: u16 = 8000;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Demo catalogs bundled into the binary; real network providers register
/// through the same `FoodDataProvider` trait.
fn demo_providers() -> anyhow::Result<Vec<Arc<FixtureProvider>>> {
    let catalogs = [
        ("openfoodfacts", include_str!("../data/catalogs/off.json")),
        ("usda", include_str!("../data/catalogs/usda.json")),
        ("nutritionix", include_str!("../data/catalogs/nutritionix.json")),
    ];
    let mut providers = Vec::with_capacity(catalogs.len());
    for (id, json) in catalogs {
        providers.push(Arc::new(FixtureProvider::from_catalog_json(id, json)?));
    }
    Ok(providers)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = SearchConfig::load_default().context("loading search config")?;
    let policy = config.executor_policy().context("validating lookup policy")?;

    let metrics = Metrics::init(&policy).context("installing metrics recorder")?;

    let mut executor = ProviderExecutor::new(policy);
    for provider in demo_providers()? {
        executor.register(provider);
    }

    let provenance = ProvenanceRegistry::load_from_file("config/provenance.json");

    let state = AppState::new(
        Arc::new(executor),
        config.priorities.clone(),
        provenance,
        config.settings,
    );
    let router = create_router(state).merge(metrics.router());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(%addr, "search service listening");
    axum::serve(listener, router).await.context("serving http")?;
    Ok(())
}
