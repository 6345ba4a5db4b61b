//! Authority tier classification for documentation sources.
//!
//! Every URL resolves to exactly one [`Tier`]. Tier-1 is canonical
//! documentation (vendor docs domains, official references), Tier-2 is known
//! technical hubs (code hosting, academic preprints), Tier-3 is the general
//! web. Patterns are checked in tier order, so a host matching both a Tier-1
//! and a Tier-2 pattern resolves to Tier-1: authority always wins ties.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::config::TierConfig;
use crate::error::{HarnessError, Result};
use crate::urls;

/// Authority ranking of a documentation source. Lower is more authoritative;
/// the `Ord` impl sorts Tier-1 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Official documentation: vendor docs domains, canonical references.
    #[serde(rename = "tier1")]
    Tier1,
    /// Known technical hubs: code hosting, academic preprint servers.
    #[serde(rename = "tier2")]
    Tier2,
    /// Everything else on the general web.
    #[serde(rename = "tier3")]
    Tier3,
}

impl Tier {
    /// Numeric rank, for manifests and log lines.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Tier1 => 1,
            Tier::Tier2 => 2,
            Tier::Tier3 => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.rank())
    }
}

/// Compiled host/path pattern sets for one tier.
struct TierPatterns {
    hosts: GlobSet,
    paths: GlobSet,
}

impl TierPatterns {
    fn compile(hosts: &[String], paths: &[String]) -> Result<Self> {
        Ok(Self {
            hosts: build_globset(hosts)?,
            paths: build_globset(paths)?,
        })
    }

    fn matches(&self, host: &str, path: &str) -> bool {
        self.hosts.is_match(host) || self.paths.is_match(path)
    }
}

/// Pure, total URL-to-tier classifier.
///
/// Compiled once from configuration; [`classify`](TierClassifier::classify)
/// never fails — a URL that matches nothing is Tier-3 by definition.
pub struct TierClassifier {
    tier1: TierPatterns,
    tier2: TierPatterns,
}

impl TierClassifier {
    pub fn new(config: &TierConfig) -> Result<Self> {
        Ok(Self {
            tier1: TierPatterns::compile(&config.tier1_hosts, &config.tier1_paths)?,
            tier2: TierPatterns::compile(&config.tier2_hosts, &config.tier2_paths)?,
        })
    }

    /// Classify a URL. Tier-1 patterns are checked before Tier-2 patterns,
    /// so overlaps resolve to the higher authority.
    pub fn classify(&self, url: &str) -> Tier {
        let host = urls::host_of(url);
        let path = urls::path_of(url);

        if self.tier1.matches(&host, &path) {
            Tier::Tier1
        } else if self.tier2.matches(&host, &path) {
            Tier::Tier2
        } else {
            Tier::Tier3
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| HarnessError::Config(format!("bad tier pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| HarnessError::Config(format!("cannot compile tier patterns: {}", e)))
}
