//! External collaborator interfaces.
//!
//! The loop's collaborators — web search, site mapping, page fetching, the
//! coding agent, and the validation gate — are all consumed through trait
//! objects so that the core stays provider-agnostic and tests can script
//! them. Production implementations live in [`crate::firecrawl`],
//! [`crate::agent`], and [`crate::gate`].

use async_trait::async_trait;

use crate::error::Result;

/// One result row from a web search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
}

/// The fetched content of a single URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub title: Option<String>,
}

/// Web search over the general internet.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ordered search results. Transport or auth failure is a
    /// [`HarnessError::Provider`](crate::error::HarnessError::Provider).
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Enumerates the URLs reachable under a seed host/path.
#[async_trait]
pub trait MapProvider: Send + Sync {
    async fn map(&self, seed_url: &str, limit: usize) -> Result<Vec<String>>;
}

/// Fetches one page as normalized text.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Per-URL failure is a
    /// [`HarnessError::Fetch`](crate::error::HarnessError::Fetch); callers
    /// record it and continue, a partial corpus is valid.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// The coding agent under instruction.
///
/// No contract on internal behavior — only on the returned text, which must
/// be parsed against the strict protocol in [`crate::protocol`].
#[async_trait]
pub trait Agent: Send + Sync {
    async fn attempt(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Verdict of the validation gate on a claimed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Rejected { reason: String },
}

/// Confirms or rejects a claimed completion in an isolated environment.
///
/// Treated as an opaque oracle by the teacher loop. A sandbox boundary
/// violation surfaces as
/// [`HarnessError::Security`](crate::error::HarnessError::Security), which is
/// fatal and never downgraded.
#[async_trait]
pub trait ValidationGate: Send + Sync {
    async fn validate(&self, claimed_summary: &str, raw_output: &str) -> Result<Verdict>;
}
