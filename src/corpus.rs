//! Corpus store: fetched pages plus the authoritative manifest.
//!
//! The store exclusively owns page content and the manifest. All content
//! mutation flows through [`CorpusStore::fetch`]; discovery and gap
//! resolution only hand sources in. The manifest is rewritten atomically
//! (temp file + rename) on every mutation, so the teacher loop never
//! observes a partially updated index.
//!
//! On disk a corpus is a directory:
//!
//! ```text
//! corpus/<run>/
//!   manifest.json
//!   001_docs-rs-serde.md
//!   002_github-com-serde-rs.md
//!   trace.json            (written by the teacher loop)
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{HarnessError, Result};
use crate::models::{CorpusPage, FetchStatus, Manifest, ManifestEntry, Source};
use crate::providers::FetchProvider;
use crate::urls;

/// Chars-per-token heuristic used for every token estimate.
const CHARS_PER_TOKEN: usize = 4;

const MANIFEST_FILE: &str = "manifest.json";

/// Deterministic token estimate for page content.
pub fn estimate_tokens(content: &str) -> usize {
    content.len() / CHARS_PER_TOKEN
}

/// Result of one fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResult {
    /// Page fetched and added to the corpus.
    Added,
    /// URL already present; the cached page stands.
    AlreadyPresent,
    /// Provider failed; recorded in the manifest, run proceeds.
    Failed,
}

pub struct CorpusStore {
    dir: PathBuf,
    manifest: Manifest,
    /// Normalized URL → manifest position, for idempotence checks.
    known: HashMap<String, usize>,
    next_local_id: u64,
}

impl CorpusStore {
    /// Create a new corpus directory and write an empty manifest.
    pub fn create(dir: &Path, task: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            HarnessError::Config(format!("cannot create corpus dir {}: {}", dir.display(), e))
        })?;
        let store = Self {
            dir: dir.to_path_buf(),
            manifest: Manifest::new(task),
            known: HashMap::new(),
            next_local_id: 1,
        };
        store.write_manifest()?;
        Ok(store)
    }

    /// Open an existing corpus from its manifest.
    pub fn open(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            HarnessError::Config(format!(
                "no manifest at {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            HarnessError::Config(format!(
                "corrupt manifest at {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        let known = manifest
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.url.clone(), idx))
            .collect();
        let next_local_id = manifest
            .entries
            .iter()
            .map(|e| e.local_id)
            .max()
            .unwrap_or(0)
            + 1;

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            known,
            next_local_id,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Number of successfully fetched pages.
    pub fn page_count(&self) -> usize {
        self.manifest.page_count()
    }

    pub fn total_tokens(&self) -> usize {
        self.manifest.total_tokens
    }

    /// Is this URL already recorded (fetched or failed)?
    pub fn contains(&self, url: &str) -> bool {
        self.known.contains_key(&urls::normalize(url))
    }

    /// Fetch one source through the provider and record the result.
    ///
    /// Idempotent per normalized URL: an already-present source is a no-op.
    /// A provider failure is recorded as a failed entry and absorbed — the
    /// run proceeds with whatever pages succeeded. On success the source is
    /// promoted: its `fetched_at` is set alongside the manifest entry's.
    pub async fn fetch(
        &mut self,
        fetcher: &dyn FetchProvider,
        source: &mut Source,
    ) -> Result<FetchResult> {
        let url = urls::normalize(&source.url);
        if self.known.contains_key(&url) {
            return Ok(FetchResult::AlreadyPresent);
        }

        let local_id = self.next_local_id;
        self.next_local_id += 1;

        match fetcher.fetch(&url).await {
            Ok(page) => {
                let token_estimate = estimate_tokens(&page.content);
                let filename = page_filename(local_id, &url);
                let path = self.dir.join(&filename);
                std::fs::write(&path, &page.content).map_err(|e| HarnessError::Fetch {
                    url: url.clone(),
                    cause: format!("cannot write {}: {}", path.display(), e),
                })?;

                let mut hasher = Sha256::new();
                hasher.update(page.content.as_bytes());
                let content_hash = format!("{:x}", hasher.finalize());

                let fetched_at = Utc::now();
                source.fetched_at = Some(fetched_at);
                let entry = ManifestEntry {
                    local_id,
                    url: url.clone(),
                    tier: source.tier,
                    title: page.title.or_else(|| source.title.clone()),
                    content_hash,
                    token_estimate,
                    file: Some(filename),
                    fetched_at: Some(fetched_at),
                    fetch: FetchStatus::Fetched,
                };
                self.known.insert(url, self.manifest.entries.len());
                self.manifest.entries.push(entry);
                self.manifest.recompute_totals();
                self.write_manifest()?;
                Ok(FetchResult::Added)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "page fetch failed, recording and continuing");
                let entry = ManifestEntry {
                    local_id,
                    url: url.clone(),
                    tier: source.tier,
                    title: source.title.clone(),
                    content_hash: String::new(),
                    token_estimate: 0,
                    file: None,
                    fetched_at: None,
                    fetch: FetchStatus::Failed {
                        error: e.to_string(),
                    },
                };
                self.known.insert(url, self.manifest.entries.len());
                self.manifest.entries.push(entry);
                self.manifest.recompute_totals();
                self.write_manifest()?;
                Ok(FetchResult::Failed)
            }
        }
    }

    /// Fetch a batch of sources, stopping at the page-count ceiling.
    /// Returns the number of pages added.
    pub async fn ingest(
        &mut self,
        fetcher: &dyn FetchProvider,
        sources: &mut [Source],
        limit: usize,
    ) -> Result<usize> {
        let mut added = 0;
        for source in sources.iter_mut() {
            if self.page_count() >= limit {
                warn!(limit, "corpus page limit reached, remaining sources skipped");
                break;
            }
            if self.fetch(fetcher, source).await? == FetchResult::Added {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Load all fetched pages as one context string for the agent.
    ///
    /// Pages are ordered Tier-1 first (fetch order within a tier) and each is
    /// labeled with its tier and URL — this ordering and labeling is the
    /// whole tier-conflict policy; content is never arbitrated.
    pub fn load_context(&self) -> Result<String> {
        let mut fetched: Vec<&ManifestEntry> = self
            .manifest
            .entries
            .iter()
            .filter(|e| e.fetch == FetchStatus::Fetched)
            .collect();
        fetched.sort_by_key(|e| (e.tier, e.local_id));

        let mut parts = Vec::with_capacity(fetched.len());
        for entry in fetched {
            let filename = entry.file.as_ref().ok_or_else(|| {
                HarnessError::Config(format!(
                    "manifest entry for {} is marked fetched but names no file",
                    entry.url
                ))
            })?;
            let path = self.dir.join(filename);
            let content = std::fs::read_to_string(&path).map_err(|e| {
                HarnessError::Config(format!("missing corpus page {}: {}", path.display(), e))
            })?;
            parts.push(format!(
                "=== [TIER {}] SOURCE: {} ===\n\n{}",
                entry.tier.rank(),
                entry.url,
                content.trim()
            ));
        }
        Ok(parts.join("\n\n"))
    }

    /// Read back one fetched page.
    pub fn page(&self, url: &str) -> Result<CorpusPage> {
        let normalized = urls::normalize(url);
        let idx = self
            .known
            .get(&normalized)
            .copied()
            .ok_or_else(|| HarnessError::Config(format!("no such page: {}", normalized)))?;
        let entry = &self.manifest.entries[idx];
        let filename = entry.file.as_ref().ok_or_else(|| HarnessError::Config(
            format!("page {} was never fetched", normalized),
        ))?;
        let content = std::fs::read_to_string(self.dir.join(filename)).map_err(|e| {
            HarnessError::Config(format!("missing corpus page {}: {}", filename, e))
        })?;
        Ok(CorpusPage {
            source_url: entry.url.clone(),
            tier: entry.tier,
            local_id: entry.local_id,
            title: entry.title.clone(),
            token_estimate: estimate_tokens(&content),
            content,
        })
    }

    /// Atomically rewrite the manifest: write to a temp file in the corpus
    /// dir, then rename over the old one.
    fn write_manifest(&self) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let tmp = self.dir.join(format!("{}.tmp", MANIFEST_FILE));
        let json = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| HarnessError::Config(format!("cannot serialize manifest: {}", e)))?;
        std::fs::write(&tmp, json).map_err(|e| {
            HarnessError::Config(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            HarnessError::Config(format!("cannot replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

/// Slugified page filename, prefixed with the local id for stable ordering.
fn page_filename(local_id: u64, url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let slug: String = without_scheme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let mut collapsed = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push(c);
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }
    collapsed.truncate(60);
    format!("{:03}_{}.md", local_id, collapsed.trim_matches('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoveredVia;
    use crate::providers::FetchedPage;
    use crate::tier::Tier;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted fetcher: URLs in `fail` error out, everything else returns
    /// canned content.
    struct ScriptedFetcher {
        fail: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FetchProvider for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> crate::error::Result<FetchedPage> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail.iter().any(|f| url.contains(f)) {
                return Err(HarnessError::Fetch {
                    url: url.to_string(),
                    cause: "simulated failure".into(),
                });
            }
            Ok(FetchedPage {
                content: format!("content of {} padded to some length", url),
                title: Some("Page".into()),
            })
        }
    }

    fn source(url: &str, tier: Tier) -> Source {
        Source {
            url: urls::normalize(url),
            tier,
            title: None,
            discovered_via: DiscoveredVia::Map,
            fetched_at: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent_per_normalized_url() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&[]);

        let first = store
            .fetch(&fetcher, &mut source("https://docs.rs/serde/", Tier::Tier1))
            .await
            .unwrap();
        let second = store
            .fetch(&fetcher, &mut source("https://DOCS.rs/serde", Tier::Tier1))
            .await
            .unwrap();

        assert_eq!(first, FetchResult::Added);
        assert_eq!(second, FetchResult::AlreadyPresent);
        assert_eq!(store.page_count(), 1);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_recorded_not_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&["broken"]);

        store
            .fetch(&fetcher, &mut source("https://e.com/docs/ok", Tier::Tier1))
            .await
            .unwrap();
        let result = store
            .fetch(&fetcher, &mut source("https://e.com/docs/broken", Tier::Tier1))
            .await
            .unwrap();

        assert_eq!(result, FetchResult::Failed);
        assert_eq!(store.page_count(), 1);
        assert_eq!(store.manifest().entries.len(), 2);
        assert!(matches!(
            store.manifest().entries[1].fetch,
            FetchStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_total_tokens_invariant_across_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&["bad"]);

        for url in [
            "https://e.com/docs/a",
            "https://e.com/docs/bad1",
            "https://e.com/docs/b",
            "https://e.com/docs/bad2",
            "https://e.com/docs/c",
        ] {
            store.fetch(&fetcher, &mut source(url, Tier::Tier2)).await.unwrap();
        }

        let expected: usize = store
            .manifest()
            .entries
            .iter()
            .filter(|e| e.fetch == FetchStatus::Fetched)
            .map(|e| e.token_estimate)
            .sum();
        assert_eq!(store.total_tokens(), expected);
        assert!(store.total_tokens() > 0);
    }

    #[tokio::test]
    async fn test_local_ids_monotonic_never_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&["bad"]);

        store
            .fetch(&fetcher, &mut source("https://e.com/docs/a", Tier::Tier1))
            .await
            .unwrap();
        store
            .fetch(&fetcher, &mut source("https://e.com/docs/bad", Tier::Tier1))
            .await
            .unwrap();
        store
            .fetch(&fetcher, &mut source("https://e.com/docs/b", Tier::Tier1))
            .await
            .unwrap();

        let ids: Vec<u64> = store.manifest().entries.iter().map(|e| e.local_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reopen_preserves_state() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new(&[]);
        {
            let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
            store
                .fetch(&fetcher, &mut source("https://e.com/docs/a", Tier::Tier1))
                .await
                .unwrap();
        }
        let mut store = CorpusStore::open(tmp.path()).unwrap();
        assert!(store.contains("https://e.com/docs/a/"));
        store
            .fetch(&fetcher, &mut source("https://e.com/docs/b", Tier::Tier1))
            .await
            .unwrap();
        assert_eq!(store.manifest().entries[1].local_id, 2);
    }

    #[tokio::test]
    async fn test_context_orders_tier1_first() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&[]);

        store
            .fetch(&fetcher, &mut source("https://blog.e.com/post", Tier::Tier3))
            .await
            .unwrap();
        store
            .fetch(&fetcher, &mut source("https://docs.e.com/guide", Tier::Tier1))
            .await
            .unwrap();

        let context = store.load_context().unwrap();
        let tier1_pos = context.find("docs.e.com/guide").unwrap();
        let tier3_pos = context.find("blog.e.com/post").unwrap();
        assert!(tier1_pos < tier3_pos);
        assert!(context.contains("[TIER 1]"));
        assert!(context.contains("[TIER 3]"));
    }

    #[tokio::test]
    async fn test_ingest_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&[]);

        let mut sources: Vec<Source> = (0..5)
            .map(|i| source(&format!("https://e.com/docs/{}", i), Tier::Tier1))
            .collect();
        let added = store.ingest(&fetcher, &mut sources, 3).await.unwrap();
        assert_eq!(added, 3);
        assert_eq!(store.page_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_promotes_source_fetched_at() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&["bad"]);

        let mut ok = source("https://e.com/docs/a", Tier::Tier1);
        store.fetch(&fetcher, &mut ok).await.unwrap();
        assert!(ok.fetched_at.is_some());
        assert_eq!(store.manifest().entries[0].fetched_at, ok.fetched_at);

        // A failed fetch leaves the source unpromoted.
        let mut bad = source("https://e.com/docs/bad", Tier::Tier1);
        store.fetch(&fetcher, &mut bad).await.unwrap();
        assert!(bad.fetched_at.is_none());
        assert!(store.manifest().entries[1].fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_page_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
        let fetcher = ScriptedFetcher::new(&[]);

        store
            .fetch(&fetcher, &mut source("https://docs.e.com/guide/", Tier::Tier1))
            .await
            .unwrap();

        // The URL is looked up normalized, however it is spelled.
        let page = store.page("https://DOCS.e.com/guide").unwrap();
        assert_eq!(page.source_url, "https://docs.e.com/guide");
        assert_eq!(page.tier, Tier::Tier1);
        assert_eq!(page.local_id, 1);
        assert!(page.content.contains("https://docs.e.com/guide"));
        assert_eq!(page.token_estimate, estimate_tokens(&page.content));

        assert!(store.page("https://docs.e.com/never-fetched").is_err());
    }

    #[tokio::test]
    async fn test_fetched_entry_without_file_is_an_error_not_a_panic() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut store = CorpusStore::create(tmp.path(), "demo").unwrap();
            store
                .fetch(&ScriptedFetcher::new(&[]), &mut source("https://e.com/docs/a", Tier::Tier1))
                .await
                .unwrap();
        }

        // Hand-edit the manifest: still marked fetched, but no file.
        let manifest_path = tmp.path().join(MANIFEST_FILE);
        let mut manifest: Manifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        manifest.entries[0].file = None;
        std::fs::write(&manifest_path, serde_json::to_string(&manifest).unwrap()).unwrap();

        let store = CorpusStore::open(tmp.path()).unwrap();
        let err = store.load_context().unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("https://e.com/docs/a"));
    }

    #[test]
    fn test_page_filename_shape() {
        let name = page_filename(7, "https://docs.rs/serde/latest");
        assert!(name.starts_with("007_"));
        assert!(name.ends_with(".md"));
        assert!(!name.contains('/'));
        assert!(!name.contains("--"));
    }
}
