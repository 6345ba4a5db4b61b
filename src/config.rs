//! TOML configuration parsing and credential lookup.
//!
//! All tunables live in a TOML file (`teach.toml` by default); credentials
//! come from the environment and are checked before any network call so a
//! missing key fails as a [`HarnessError::Config`] rather than a mid-run
//! transport error.

use serde::Deserialize;
use std::path::Path;

use crate::error::{HarnessError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub teacher: TeacherConfig,
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Hard ceiling on the number of pages in a corpus.
    #[serde(default = "default_corpus_limit")]
    pub limit: usize,
    /// Root directory for corpus runs.
    #[serde(default = "default_corpus_root")]
    pub root: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            limit: default_corpus_limit(),
            root: default_corpus_root(),
        }
    }
}

fn default_corpus_limit() -> usize {
    40
}
fn default_corpus_root() -> String {
    "corpus".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TeacherConfig {
    /// Hard retry bound for the attempt loop.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
}

impl Default for TeacherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            model: default_model(),
            max_response_tokens: default_max_response_tokens(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_response_tokens() -> u32 {
    8192
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirecrawlConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Results requested per search query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// URLs requested when mapping a seed.
    #[serde(default = "default_map_limit")]
    pub map_limit: usize,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            search_limit: default_search_limit(),
            map_limit: default_map_limit(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_search_limit() -> usize {
    5
}
fn default_map_limit() -> usize {
    200
}

/// Host and path glob patterns per authority tier. Tier-3 has no patterns:
/// it is the catch-all.
#[derive(Debug, Deserialize, Clone)]
pub struct TierConfig {
    #[serde(default = "default_tier1_hosts")]
    pub tier1_hosts: Vec<String>,
    #[serde(default = "default_tier1_paths")]
    pub tier1_paths: Vec<String>,
    #[serde(default = "default_tier2_hosts")]
    pub tier2_hosts: Vec<String>,
    #[serde(default = "default_tier2_paths")]
    pub tier2_paths: Vec<String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tier1_hosts: default_tier1_hosts(),
            tier1_paths: default_tier1_paths(),
            tier2_hosts: default_tier2_hosts(),
            tier2_paths: default_tier2_paths(),
        }
    }
}

fn default_tier1_hosts() -> Vec<String> {
    [
        "docs.*",
        "doc.*",
        "documentation.*",
        "developer.*",
        "developers.*",
        "learn.*",
        "*.readthedocs.io",
        "devdocs.io",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tier1_paths() -> Vec<String> {
    [
        "/docs",
        "/docs/**",
        "**/docs/**",
        "/documentation",
        "/documentation/**",
        "/reference",
        "/reference/**",
        "/api",
        "/api/**",
        "/manual",
        "/manual/**",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tier2_hosts() -> Vec<String> {
    [
        "github.com",
        "*.github.io",
        "gitlab.com",
        "bitbucket.org",
        "arxiv.org",
        "*.arxiv.org",
        "stackoverflow.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tier2_paths() -> Vec<String> {
    ["**/README*", "**/readme*"].into_iter().map(String::from).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    /// Run `python -m py_compile` / `bash -n` probes on extracted code
    /// blocks. Off by default so runs without those toolchains behave
    /// identically.
    #[serde(default)]
    pub syntax_probes: bool,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            syntax_probes: false,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    20
}

impl Config {
    /// A default config for tests and commands that do not need a file.
    pub fn minimal() -> Self {
        Config::default()
    }
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            HarnessError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.corpus.limit == 0 {
        return Err(HarnessError::Config("corpus.limit must be >= 1".into()));
    }
    if config.teacher.max_attempts == 0 {
        return Err(HarnessError::Config(
            "teacher.max_attempts must be >= 1".into(),
        ));
    }
    if config.teacher.model.is_empty() {
        return Err(HarnessError::Config("teacher.model must be set".into()));
    }
    if config.firecrawl.search_limit == 0 {
        return Err(HarnessError::Config(
            "firecrawl.search_limit must be >= 1".into(),
        ));
    }
    Ok(())
}

/// Firecrawl API key from the environment.
pub fn firecrawl_api_key() -> Result<String> {
    std::env::var("FIRECRAWL_API_KEY")
        .map_err(|_| HarnessError::Config("FIRECRAWL_API_KEY environment variable not set".into()))
}

/// Anthropic API key from the environment.
pub fn anthropic_api_key() -> Result<String> {
    std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| HarnessError::Config("ANTHROPIC_API_KEY environment variable not set".into()))
}
