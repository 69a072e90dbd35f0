// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod lookup;
pub mod metrics;
pub mod query;
pub mod reconcile;
pub mod serving;
pub mod trust;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::lookup::{ExecutionOptions, ExecutorPolicy, PolicyError, ProviderExecutor};
pub use crate::reconcile::{
    build_provider_dedupe_key, reconcile, CandidateDecision, CandidateSelectionReason,
    ReconciledCandidates,
};
pub use crate::trust::{decision_key, ProvenanceRegistry, TrustSignals};
