//! Core data types for the teaching loop.
//!
//! These types represent the sources, corpus pages, manifest entries, and
//! attempt records that flow through discovery, corpus construction, and the
//! teacher state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// How a source was surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveredVia {
    /// Derived search query during initial discovery.
    Search,
    /// Enumerated from the seed URL by the map provider.
    Map,
    /// Supplementary search triggered by an agent-declared knowledge gap.
    GapSearch,
}

/// A candidate or confirmed document location.
///
/// `url` is stored normalized and is the unique key within a run. A source is
/// never deleted once discovered; failed fetches are recorded in the manifest
/// rather than dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub tier: Tier,
    pub title: Option<String>,
    pub discovered_via: DiscoveredVia,
    /// Set by the corpus store when the source is fetched; stays `None` for
    /// candidates and failed fetches.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// The fetched, normalized content of one source.
///
/// `local_id` is assigned once in fetch order and never reused;
/// `token_estimate` is always recomputed from `content`, never cached
/// independently.
#[derive(Debug, Clone)]
pub struct CorpusPage {
    pub source_url: String,
    pub tier: Tier,
    pub local_id: u64,
    pub title: Option<String>,
    pub content: String,
    pub token_estimate: usize,
}

/// Fetch status of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FetchStatus {
    Fetched,
    Failed { error: String },
}

/// One row of the manifest: the persisted index record for a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub local_id: u64,
    pub url: String,
    pub tier: Tier,
    pub title: Option<String>,
    /// Content hash of the stored page (empty for failed fetches).
    pub content_hash: String,
    pub token_estimate: usize,
    pub file: Option<String>,
    /// When the page was fetched; absent for failed fetches.
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fetch: FetchStatus,
}

/// The authoritative index over all corpus pages in a run.
///
/// `total_tokens` always equals the sum of fetched entries' token estimates;
/// the corpus store recomputes it and rewrites the manifest atomically on
/// every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub task: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
    pub total_tokens: usize,
}

impl Manifest {
    pub fn new(task: &str) -> Self {
        let now = Utc::now();
        Self {
            task: task.to_string(),
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
            total_tokens: 0,
        }
    }

    /// Number of successfully fetched pages.
    pub fn page_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.fetch == FetchStatus::Fetched)
            .count()
    }

    /// Recompute `total_tokens` from the fetched entries.
    pub fn recompute_totals(&mut self) {
        self.total_tokens = self
            .entries
            .iter()
            .filter(|e| e.fetch == FetchStatus::Fetched)
            .map(|e| e.token_estimate)
            .sum();
        self.updated_at = Utc::now();
    }
}

/// Parsed outcome of one agent response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    /// Agent claimed completion; `summary` is the marker payload.
    Complete { summary: String },
    /// Agent declared a knowledge gap with a search query.
    Gap { query: String },
    /// Response matched neither legitimate shape; the raw text is kept
    /// verbatim for diagnosis.
    ProtocolViolation { raw_response: String },
}

/// One iteration of the teacher loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based, strictly increasing with no gaps.
    pub attempt_number: u32,
    /// Total corpus tokens visible to the agent at this attempt.
    pub corpus_snapshot_tokens: usize,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of a run. Exhaustion and cancellation are results, not
/// errors: the run completed, it simply did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Succeeded { summary: String },
    Exhausted,
    Cancelled,
}

/// Full result of a teacher run, including the ordered attempt trace consumed
/// by downstream skill synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub task: String,
    pub outcome: RunOutcome,
    pub attempts: u32,
    pub gaps_filled: Vec<String>,
    pub trace: Vec<AttemptRecord>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;

    #[test]
    fn test_manifest_totals_only_count_fetched() {
        let mut manifest = Manifest::new("demo");
        manifest.entries.push(ManifestEntry {
            local_id: 1,
            url: "https://docs.rs/a".into(),
            tier: Tier::Tier1,
            title: None,
            content_hash: "abc".into(),
            token_estimate: 100,
            file: Some("001_a.md".into()),
            fetched_at: Some(Utc::now()),
            fetch: FetchStatus::Fetched,
        });
        manifest.entries.push(ManifestEntry {
            local_id: 2,
            url: "https://docs.rs/b".into(),
            tier: Tier::Tier1,
            title: None,
            content_hash: String::new(),
            token_estimate: 0,
            file: None,
            fetched_at: None,
            fetch: FetchStatus::Failed {
                error: "timeout".into(),
            },
        });
        manifest.recompute_totals();
        assert_eq!(manifest.total_tokens, 100);
        assert_eq!(manifest.page_count(), 1);
        assert_eq!(manifest.entries.len(), 2);
    }

    #[test]
    fn test_outcome_serde_roundtrip() {
        let outcome = AttemptOutcome::Gap {
            query: "tokio select semantics".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"kind\":\"gap\""));
        let back: AttemptOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
