// src/reconcile.rs
//! Cross-provider candidate reconciliation.
//!
//! Candidates from different providers that describe the same physical food
//! are clustered under a dedupe key, and one representative per cluster is
//! selected with an explicit, recorded reason. Pure and synchronous: no
//! blocking, no shared state, safe from any thread. The output is invariant
//! to the order the per-provider lists are supplied in and to the internal
//! order of each list.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::lookup::types::RemoteFoodCandidate;
use crate::trust::decision_key;

/// Why a cluster's representative was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateSelectionReason {
    SingleSourceResult,
    BarcodeMatch,
    MostCompleteNutrition,
    PreferredSource,
    DeterministicTieBreak,
}

/// One decision per reconciled cluster, keyed (in `ReconciledCandidates`)
/// by the selected candidate's decision key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub selected_provider_id: String,
    /// Ordered: ascending priority rank, then lexical id.
    pub contributing_provider_ids: Vec<String>,
    pub reason: CandidateSelectionReason,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReconciledCandidates {
    pub selected: Vec<RemoteFoodCandidate>,
    pub decisions: HashMap<String, CandidateDecision>,
}

/// Compute the identity string that clusters candidates describing the same
/// physical food across providers.
pub fn build_provider_dedupe_key(candidate: &RemoteFoodCandidate) -> String {
    if let Some(barcode) = candidate.barcode.as_deref() {
        let trimmed = barcode.trim();
        if !trimmed.is_empty() {
            return format!("barcode:{trimmed}");
        }
    }

    let name = fold(&candidate.name);
    if name.is_empty() {
        return format!("source:{}|{}", candidate.source, candidate.source_id);
    }

    let brand = candidate.brand.as_deref().map(fold).unwrap_or_default();
    let serving = candidate.serving_size.as_deref().map(fold).unwrap_or_default();
    if brand.is_empty() && serving.is_empty() {
        return format!("source:{}|{}|{}", candidate.source, candidate.source_id, name);
    }

    format!("text:{name}|{brand}|{serving}")
}

/// Deduplicate and select one winning candidate per physical food item.
///
/// `priorities` maps providerId → rank (lower = more preferred) and is used
/// only for tie-breaking, never as primary order. Providers absent from the
/// map rank last.
pub fn reconcile(
    per_provider: &[(String, Vec<RemoteFoodCandidate>)],
    priorities: &HashMap<String, u32>,
) -> ReconciledCandidates {
    let mut clusters: BTreeMap<String, Vec<(&str, &RemoteFoodCandidate)>> = BTreeMap::new();
    for (provider_id, list) in per_provider {
        for candidate in list {
            clusters
                .entry(build_provider_dedupe_key(candidate))
                .or_default()
                .push((provider_id.as_str(), candidate));
        }
    }

    let mut selected = Vec::with_capacity(clusters.len());
    let mut decisions = HashMap::with_capacity(clusters.len());

    for (cluster_key, members) in clusters {
        let (winner_pid, winner, reason) = select_member(&cluster_key, &members, priorities);

        let chosen = winner.clone().with_provider_key(winner_pid);

        let mut contributing: Vec<String> =
            members.iter().map(|(pid, _)| pid.to_string()).collect();
        contributing.sort();
        contributing.dedup();
        contributing.sort_by_key(|pid| (rank(priorities, pid), pid.clone()));

        decisions.insert(
            decision_key(&chosen),
            CandidateDecision {
                selected_provider_id: winner_pid.to_string(),
                contributing_provider_ids: contributing,
                reason,
            },
        );
        selected.push(chosen);
    }

    ReconciledCandidates {
        selected,
        decisions,
    }
}

/// Pick the cluster winner and the reason that decided it.
fn select_member<'a>(
    cluster_key: &str,
    members: &[(&'a str, &'a RemoteFoodCandidate)],
    priorities: &HashMap<String, u32>,
) -> (&'a str, &'a RemoteFoodCandidate, CandidateSelectionReason) {
    let (winner_pid, winner) = members
        .iter()
        .min_by(|a, b| member_order(a, b, priorities))
        .copied()
        .expect("cluster is never empty");

    let distinct: BTreeSet<&str> = members.iter().map(|(pid, _)| *pid).collect();
    let barcode_cluster = cluster_key.starts_with("barcode:");

    let reason = if distinct.len() == 1 {
        CandidateSelectionReason::SingleSourceResult
    } else {
        let max_count = members
            .iter()
            .map(|(_, c)| c.populated_nutrient_count())
            .max()
            .unwrap_or(0);
        let richest: Vec<&(&str, &RemoteFoodCandidate)> = members
            .iter()
            .filter(|(_, c)| c.populated_nutrient_count() == max_count)
            .collect();
        if richest.len() == 1 {
            if barcode_cluster {
                CandidateSelectionReason::BarcodeMatch
            } else {
                CandidateSelectionReason::MostCompleteNutrition
            }
        } else {
            let min_rank = richest
                .iter()
                .map(|(pid, _)| rank(priorities, pid))
                .min()
                .unwrap_or(u32::MAX);
            let preferred: Vec<_> = richest
                .iter()
                .filter(|(pid, _)| rank(priorities, pid) == min_rank)
                .collect();
            if preferred.len() == 1 {
                if barcode_cluster {
                    CandidateSelectionReason::BarcodeMatch
                } else {
                    CandidateSelectionReason::PreferredSource
                }
            } else {
                // Only the lexical-id fallback is tagged as such.
                CandidateSelectionReason::DeterministicTieBreak
            }
        }
    };

    (winner_pid, winner, reason)
}

/// Total order: richness desc, priority rank asc, provider id asc, then
/// source/source_id so even same-provider duplicates resolve identically
/// regardless of input order.
fn member_order(
    a: &(&str, &RemoteFoodCandidate),
    b: &(&str, &RemoteFoodCandidate),
    priorities: &HashMap<String, u32>,
) -> Ordering {
    b.1.populated_nutrient_count()
        .cmp(&a.1.populated_nutrient_count())
        .then_with(|| rank(priorities, a.0).cmp(&rank(priorities, b.0)))
        .then_with(|| a.0.cmp(b.0))
        .then_with(|| a.1.source.cmp(&b.1.source))
        .then_with(|| a.1.source_id.cmp(&b.1.source_id))
}

fn rank(priorities: &HashMap<String, u32>, provider_id: &str) -> u32 {
    priorities.get(provider_id).copied().unwrap_or(u32::MAX)
}

/// Trim/lower-case/whitespace-collapse for key fields.
fn fold(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
