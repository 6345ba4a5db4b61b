//! Gap resolution: supplementary search to fill an agent-declared gap.
//!
//! Reuses the discovery ranking primitives, drops every URL the corpus
//! already knows (regardless of tier — a known source is not re-ranked), and
//! fetches the remainder through the corpus store under the remaining page
//! budget. An exhausted budget is degraded but not fatal: the loop proceeds
//! with the unchanged corpus.

use tracing::{info, warn};

use crate::corpus::CorpusStore;
use crate::discovery::{make_source, rank};
use crate::error::Result;
use crate::models::{DiscoveredVia, Source};
use crate::providers::{FetchProvider, SearchProvider};
use crate::tier::TierClassifier;

/// Outcome of one gap resolution, surfaced to the operator in the run
/// summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapResolution {
    pub query: String,
    pub new_sources: usize,
    pub pages_added: usize,
    /// True when the corpus was already at its page ceiling.
    pub budget_exhausted: bool,
}

/// Search for `query`, merge new sources into the corpus.
pub async fn resolve(
    query: &str,
    store: &mut CorpusStore,
    search: &dyn SearchProvider,
    fetcher: &dyn FetchProvider,
    classifier: &TierClassifier,
    corpus_limit: usize,
    search_limit: usize,
) -> Result<GapResolution> {
    let remaining = corpus_limit.saturating_sub(store.page_count());
    if remaining == 0 {
        warn!(
            query,
            corpus_limit, "gap resolution skipped: corpus already at page limit"
        );
        return Ok(GapResolution {
            query: query.to_string(),
            new_sources: 0,
            pages_added: 0,
            budget_exhausted: true,
        });
    }

    let hits = search.search(query, search_limit).await?;

    let candidates: Vec<Source> = hits
        .iter()
        .map(|hit| {
            make_source(
                &hit.url,
                hit.title.clone(),
                DiscoveredVia::GapSearch,
                classifier,
            )
        })
        .filter(|source| !store.contains(&source.url))
        .collect();

    let mut new_sources = rank(candidates, remaining);
    let pages_added = store.ingest(fetcher, &mut new_sources, corpus_limit).await?;

    info!(
        query,
        found = new_sources.len(),
        added = pages_added,
        "gap resolution merged"
    );

    Ok(GapResolution {
        query: query.to_string(),
        new_sources: new_sources.len(),
        pages_added,
        budget_exhausted: false,
    })
}
