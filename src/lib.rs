//! # Teach Harness
//!
//! A retrieval-augmented teacher loop for AI coding agents.
//!
//! Given a natural-language task, Teach Harness discovers documentation
//! sources, builds a token-budgeted local corpus, and drives a coding agent
//! through a bounded attempt loop. The agent must end every response with
//! either a completion claim or a knowledge-gap declaration; gaps trigger a
//! supplementary search that grows the corpus before the next attempt, and
//! completion claims pass through a validation gate before they are trusted.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Discovery │──▶│ CorpusStore  │──▶│ TeacherLoop │
//! │ search/map│   │ manifest.json│   │  attempt ▶  │
//! └───────────┘   │ NNN_slug.md  │   │  gap? gate? │
//!       ▲         └──────▲───────┘   └──────┬──────┘
//!       │                │                  │
//!       │         ┌──────┴───────┐   ┌──────▼──────┐
//!       └─────────│ Gap resolver │◀──│  Protocol   │
//!                 └──────────────┘   │  parser     │
//!                                    └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! teach discover "integrate the stripe webhooks API"
//! teach run "integrate the stripe webhooks API" --seed https://docs.stripe.com
//! teach corpus show corpus/run-1234
//! teach search "stripe webhook signature verification"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`models`] | Core data types (sources, manifest, trace) |
//! | [`urls`] | URL normalization |
//! | [`tier`] | Source authority classification |
//! | [`providers`] | Search / map / fetch / agent / gate traits |
//! | [`firecrawl`] | Firecrawl-backed providers |
//! | [`agent`] | Anthropic-backed teacher agent |
//! | [`protocol`] | Strict two-outcome response parser |
//! | [`discovery`] | Tiered source discovery |
//! | [`corpus`] | Manifest-tracked corpus store |
//! | [`gap`] | Gap-driven supplementary search |
//! | [`teacher`] | The attempt/gap-fill state machine |
//! | [`gate`] | Completion validation gate |
//! | [`skill`] | Skill rendering from a successful run |

pub mod agent;
pub mod config;
pub mod corpus;
pub mod discovery;
pub mod error;
pub mod firecrawl;
pub mod gap;
pub mod gate;
pub mod models;
pub mod protocol;
pub mod providers;
pub mod skill;
pub mod teacher;
pub mod tier;
pub mod urls;
