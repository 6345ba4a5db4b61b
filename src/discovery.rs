//! Tiered source discovery.
//!
//! Turns a task description (or a seed URL) into a ranked, deduplicated list
//! of candidate documentation sources, capped at the corpus page limit.
//!
//! With a seed, the map provider enumerates reachable URLs and every result
//! is classified. Without one, a small fixed set of derived search queries is
//! issued and results are filtered to documentation-shaped URLs first.
//! Either way the output is deduplicated by normalized URL (first occurrence
//! wins), stably sorted by tier ascending, and truncated.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::models::{DiscoveredVia, Source};
use crate::providers::{MapProvider, SearchProvider};
use crate::tier::TierClassifier;
use crate::urls;

/// Derived queries issued when no seed URL is given.
fn derived_queries(task: &str) -> Vec<String> {
    vec![
        format!("{} official documentation", task),
        format!("{} documentation", task),
    ]
}

/// Discover documentation sources for a task.
///
/// Provider failure is a [`HarnessError::Discovery`] carrying the raw
/// provider error. An empty result set is *not* an error; it is logged as a
/// degraded start and the loop may rely entirely on gap-driven discovery.
pub async fn discover(
    task: &str,
    seed_url: Option<&str>,
    search: &dyn SearchProvider,
    map: &dyn MapProvider,
    classifier: &TierClassifier,
    corpus_limit: usize,
    search_limit: usize,
    map_limit: usize,
) -> Result<Vec<Source>> {
    let candidates = match seed_url {
        Some(seed) => discover_from_seed(seed, map, classifier, map_limit).await?,
        None => discover_from_search(task, search, classifier, search_limit).await?,
    };

    let ranked = rank(candidates, corpus_limit);

    if ranked.is_empty() {
        warn!(
            task,
            seed = seed_url.unwrap_or("<none>"),
            "degraded start: discovery yielded zero sources, relying on gap-driven discovery"
        );
    } else {
        info!(count = ranked.len(), "discovered sources");
    }

    Ok(ranked)
}

async fn discover_from_seed(
    seed: &str,
    map: &dyn MapProvider,
    classifier: &TierClassifier,
    map_limit: usize,
) -> Result<Vec<Source>> {
    let mapped = map
        .map(seed, map_limit)
        .await
        .map_err(|e| HarnessError::Discovery {
            message: format!("failed to map seed {}: {}", seed, e),
        })?;

    let seed_host = urls::host_of(seed);
    let mut sources = vec![make_source(seed, None, DiscoveredVia::Map, classifier)];
    for url in mapped {
        // Keep same-host pages plus off-host pages that look like docs.
        if urls::host_of(&url) == seed_host || urls::looks_like_docs(&url) {
            sources.push(make_source(&url, None, DiscoveredVia::Map, classifier));
        }
    }
    Ok(sources)
}

async fn discover_from_search(
    task: &str,
    search: &dyn SearchProvider,
    classifier: &TierClassifier,
    search_limit: usize,
) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for query in derived_queries(task) {
        let hits = search
            .search(&query, search_limit)
            .await
            .map_err(|e| HarnessError::Discovery {
                message: format!("search failed for '{}': {}", query, e),
            })?;
        for hit in hits {
            if urls::looks_like_docs(&hit.url) {
                sources.push(make_source(
                    &hit.url,
                    hit.title.clone(),
                    DiscoveredVia::Search,
                    classifier,
                ));
            }
        }
    }
    Ok(sources)
}

/// Build a source with a normalized URL and classified tier.
pub fn make_source(
    url: &str,
    title: Option<String>,
    discovered_via: DiscoveredVia,
    classifier: &TierClassifier,
) -> Source {
    let normalized = urls::normalize(url);
    let tier = classifier.classify(&normalized);
    Source {
        url: normalized,
        tier,
        title,
        discovered_via,
        fetched_at: None,
    }
}

/// Dedup (first occurrence wins), stable-sort by tier, truncate.
pub fn rank(candidates: Vec<Source>, limit: usize) -> Vec<Source> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<Source> = Vec::with_capacity(candidates.len());
    for source in candidates {
        if seen.insert(source.url.clone()) {
            unique.push(source);
        }
    }
    // Vec::sort_by_key is stable, so discovery order is preserved within a
    // tier.
    unique.sort_by_key(|s| s.tier);
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::tier::{Tier, TierClassifier};

    fn classifier() -> TierClassifier {
        TierClassifier::new(&TierConfig::default()).unwrap()
    }

    fn candidate(url: &str, title: Option<&str>) -> Source {
        make_source(
            url,
            title.map(str::to_string),
            DiscoveredVia::Search,
            &classifier(),
        )
    }

    #[test]
    fn test_rank_dedups_normalized_urls_first_wins() {
        let candidates = vec![
            candidate("https://docs.rs/serde/", Some("first")),
            candidate("https://DOCS.rs/serde", Some("second")),
            candidate("https://docs.rs/serde#anchor", Some("third")),
        ];
        let ranked = rank(candidates, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn test_rank_sorts_by_tier_stable_within_tier() {
        let candidates = vec![
            candidate("https://random.example.com/page", None), // tier3
            candidate("https://github.com/x/y", None),          // tier2
            candidate("https://docs.rs/a", None),               // tier1
            candidate("https://docs.rs/b", None),               // tier1
        ];
        let ranked = rank(candidates, 10);
        let tiers: Vec<Tier> = ranked.iter().map(|s| s.tier).collect();
        assert_eq!(tiers, vec![Tier::Tier1, Tier::Tier1, Tier::Tier2, Tier::Tier3]);
        // Stable: a discovered before b stays before b.
        assert_eq!(ranked[0].url, "https://docs.rs/a");
        assert_eq!(ranked[1].url, "https://docs.rs/b");
    }

    #[test]
    fn test_rank_truncates_to_limit() {
        let candidates: Vec<Source> = (0..10)
            .map(|i| candidate(&format!("https://docs.rs/crate{}", i), None))
            .collect();
        assert_eq!(rank(candidates, 4).len(), 4);
    }

    #[test]
    fn test_rank_truncation_keeps_highest_tiers() {
        let candidates = vec![
            candidate("https://blog.example.com/a", None), // tier3
            candidate("https://docs.rs/a", None),          // tier1
            candidate("https://blog.example.com/b", None), // tier3
            candidate("https://docs.rs/b", None),          // tier1
        ];
        let ranked = rank(candidates, 2);
        assert!(ranked.iter().all(|s| s.tier == Tier::Tier1));
    }
}
