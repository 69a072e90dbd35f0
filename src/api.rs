// src/api.rs
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::lookup::types::{
    CachePolicy, GuardToken, LookupSettings, ProviderExecutionReport, RemoteFoodCandidate,
    SearchRequest, SourceFilter,
};
use crate::lookup::{ExecutionOptions, ProviderExecutor};
use crate::reconcile::{self, CandidateDecision};
use crate::trust::{self, ProvenanceRegistry, TrustSignals};

#[derive(Clone)]
pub struct AppState {
    executor: Arc<ProviderExecutor>,
    priorities: Arc<HashMap<String, u32>>,
    provenance: Arc<ProvenanceRegistry>,
    settings: LookupSettings,
}

impl AppState {
    pub fn new(
        executor: Arc<ProviderExecutor>,
        priorities: HashMap<String, u32>,
        provenance: ProvenanceRegistry,
        settings: LookupSettings,
    ) -> Self {
        Self {
            executor,
            priorities: Arc::new(priorities),
            provenance: Arc::new(provenance),
            settings,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct SearchReq {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    barcode: Option<String>,
    /// Restrict to these provider ids; absent = all providers.
    #[serde(default)]
    sources: Option<Vec<String>>,
    #[serde(default)]
    force_refresh: bool,
}

#[derive(serde::Serialize)]
struct SearchResp {
    report: ProviderExecutionReport,
    selected: Vec<RemoteFoodCandidate>,
    decisions: HashMap<String, CandidateDecision>,
    trust: HashMap<String, TrustSignals>,
}

#[derive(serde::Serialize)]
struct ApiError {
    error: String,
}

fn unprocessable(msg: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiError { error: msg.into() }),
    )
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchReq>,
) -> Result<Json<SearchResp>, (StatusCode, Json<ApiError>)> {
    let request = match (body.query, body.barcode) {
        (Some(_), Some(_)) => {
            return Err(unprocessable(
                "provide either `query` or `barcode`, not both",
            ))
        }
        (Some(query), None) => SearchRequest::text(query),
        (None, Some(barcode)) => SearchRequest::barcode(barcode),
        (None, None) => return Err(unprocessable("provide `query` or `barcode`")),
    }
    .map_err(|e| unprocessable(e.to_string()))?;

    let opts = ExecutionOptions {
        source_filter: match body.sources {
            Some(ids) => SourceFilter::only(ids),
            None => SourceFilter::all(),
        },
        settings: state.settings,
        cache_policy: if body.force_refresh {
            CachePolicy::ForceRefresh
        } else {
            CachePolicy::CachePreferred
        },
        // API calls are user-triggered by definition.
        guard: Some(GuardToken::for_user_action()),
    };

    let report = state.executor.execute(&request, &opts).await;

    let per_provider: Vec<(String, Vec<RemoteFoodCandidate>)> = report
        .provider_results
        .iter()
        .filter(|r| !r.items.is_empty())
        .map(|r| (r.provider_id.clone(), r.items.clone()))
        .collect();
    let reconciled = reconcile::reconcile(&per_provider, &state.priorities);

    let trust: HashMap<String, TrustSignals> = reconciled
        .selected
        .iter()
        .map(|c| {
            let signals = trust::derive(c, &state.provenance);
            (signals.decision_key.clone(), signals)
        })
        .collect();

    Ok(Json(SearchResp {
        report,
        selected: reconciled.selected,
        decisions: reconciled.decisions,
        trust,
    }))
}
