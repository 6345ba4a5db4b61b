//! # Teach Harness CLI (`teach`)
//!
//! The `teach` binary drives the teacher loop end to end: documentation
//! discovery, corpus construction, the bounded attempt loop, and skill
//! rendering from a successful run.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `teach run "<task>"` | Run the full teacher loop for a task |
//! | `teach discover "<task>"` | Print the ranked documentation sources |
//! | `teach search "<query>"` | One-off documentation search, cached to disk |
//! | `teach corpus show <dir>` | Print the manifest of an existing corpus |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Run succeeded (completion confirmed) |
//! | 2 | Attempt budget exhausted without a confirmed completion |
//! | 130 | Cancelled by the operator |
//! | 1 | Fatal error (configuration, protocol, security, provider) |
//!
//! ## Examples
//!
//! ```bash
//! # Full loop, seeded from the official docs site
//! teach run "integrate the stripe webhooks API" --seed https://docs.stripe.com
//!
//! # Preview what discovery would fetch, without fetching
//! teach discover "set up tokio graceful shutdown"
//!
//! # Render a skill on success
//! teach run "configure nginx rate limiting" --skill-name nginx-rate-limiting
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use teach_harness::agent::AnthropicAgent;
use teach_harness::config::{self, Config};
use teach_harness::corpus::CorpusStore;
use teach_harness::discovery;
use teach_harness::firecrawl::FirecrawlClient;
use teach_harness::gate::SandboxGate;
use teach_harness::models::{FetchStatus, RunOutcome};
use teach_harness::skill;
use teach_harness::teacher::{LoopOptions, TeacherLoop};
use teach_harness::tier::TierClassifier;

/// Teach Harness — a retrieval-augmented teacher loop for AI coding agents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; a missing file falls back to built-in defaults. Credentials are
/// read from `FIRECRAWL_API_KEY` and `ANTHROPIC_API_KEY`.
#[derive(Parser)]
#[command(
    name = "teach",
    about = "Teach Harness — a retrieval-augmented teacher loop for AI coding agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./teach.toml")]
    config: PathBuf,

    /// Verbose logging (debug level for this crate).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full teacher loop for a task.
    ///
    /// Discovers documentation sources (from a seed URL if given, otherwise
    /// via derived search queries), fetches them into a fresh corpus
    /// directory, and drives the agent through the bounded attempt loop.
    /// On a confirmed completion, optionally renders a reusable skill.
    Run {
        /// The task, in natural language.
        task: String,

        /// Seed URL to map for documentation instead of searching.
        #[arg(long)]
        seed: Option<String>,

        /// Override the attempt budget from config.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override the corpus page ceiling from config.
        #[arg(long)]
        corpus_limit: Option<usize>,

        /// Render a skill under `skills/<name>/` when the run succeeds.
        #[arg(long)]
        skill_name: Option<String>,
    },

    /// Print the ranked documentation sources for a task without fetching.
    Discover {
        /// The task, in natural language.
        task: String,

        /// Seed URL to map for documentation instead of searching.
        #[arg(long)]
        seed: Option<String>,
    },

    /// One-off documentation search.
    ///
    /// Prints the hits and caches them to `cache/<timestamp>_search.md` so
    /// later skill generation can pick them up.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect an existing corpus.
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },
}

/// Corpus inspection subcommands.
#[derive(Subcommand)]
enum CorpusAction {
    /// Print the manifest of a corpus directory.
    Show {
        /// Path to the corpus directory (the one holding `manifest.json`).
        dir: PathBuf,

        /// Print one fetched page in full instead of the manifest table.
        #[arg(long)]
        page: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error ({}): {}", e.kind(), e);
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("teach_harness=debug,teach=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("teach_harness=info,teach=info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn dispatch(cli: Cli) -> teach_harness::error::Result<i32> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            task,
            seed,
            max_attempts,
            corpus_limit,
            skill_name,
        } => run_task(&cfg, &task, seed.as_deref(), max_attempts, corpus_limit, skill_name).await,
        Commands::Discover { task, seed } => {
            run_discover(&cfg, &task, seed.as_deref()).await?;
            Ok(0)
        }
        Commands::Search { query, limit } => {
            run_search(&cfg, &query, limit).await?;
            Ok(0)
        }
        Commands::Corpus {
            action: CorpusAction::Show { dir, page },
        } => {
            show_corpus(&dir, page.as_deref())?;
            Ok(0)
        }
    }
}

async fn run_task(
    cfg: &Config,
    task: &str,
    seed: Option<&str>,
    max_attempts: Option<u32>,
    corpus_limit: Option<usize>,
    skill_name: Option<String>,
) -> teach_harness::error::Result<i32> {
    let max_attempts = max_attempts.unwrap_or(cfg.teacher.max_attempts);
    let corpus_limit = corpus_limit.unwrap_or(cfg.corpus.limit);

    let firecrawl = FirecrawlClient::new(&cfg.firecrawl, config::firecrawl_api_key()?)?;
    let agent = AnthropicAgent::new(&cfg.teacher, config::anthropic_api_key()?)?;
    let gate = SandboxGate::new(&cfg.gate)?;
    let classifier = TierClassifier::new(&cfg.tiers)?;

    let run_id = Uuid::new_v4().simple().to_string();
    let corpus_dir = PathBuf::from(&cfg.corpus.root).join(format!("run-{}", &run_id[..12]));
    let mut store = CorpusStore::create(&corpus_dir, task)?;
    println!("corpus: {}", corpus_dir.display());

    let mut sources = discovery::discover(
        task,
        seed,
        &firecrawl,
        &firecrawl,
        &classifier,
        corpus_limit,
        cfg.firecrawl.search_limit,
        cfg.firecrawl.map_limit,
    )
    .await?;
    let fetched = store.ingest(&firecrawl, &mut sources, corpus_limit).await?;
    println!(
        "fetched {} of {} discovered sources ({} tokens)",
        fetched,
        sources.len(),
        store.total_tokens()
    );

    let teacher = TeacherLoop::new(
        &agent,
        &gate,
        &firecrawl,
        &firecrawl,
        &classifier,
        LoopOptions {
            max_attempts,
            corpus_limit,
            search_limit: cfg.firecrawl.search_limit,
        },
    );

    let cancel = teacher.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = teacher.run(task, &mut store).await?;

    println!();
    println!("attempts: {}", report.attempts);
    if !report.gaps_filled.is_empty() {
        println!("gaps filled:");
        for query in &report.gaps_filled {
            println!("  - {}", query);
        }
    }

    match &report.outcome {
        RunOutcome::Succeeded { summary } => {
            println!("succeeded: {}", summary);
            if let Some(name) = skill_name {
                let skill_dir =
                    skill::write_skill(&report, &name, &PathBuf::from("skills"), &corpus_dir)?;
                println!("skill: {}", skill_dir.display());
            }
            Ok(0)
        }
        RunOutcome::Exhausted => {
            println!("exhausted: attempt budget spent without a confirmed completion");
            Ok(2)
        }
        RunOutcome::Cancelled => {
            println!("cancelled");
            Ok(130)
        }
    }
}

async fn run_discover(
    cfg: &Config,
    task: &str,
    seed: Option<&str>,
) -> teach_harness::error::Result<()> {
    let firecrawl = FirecrawlClient::new(&cfg.firecrawl, config::firecrawl_api_key()?)?;
    let classifier = TierClassifier::new(&cfg.tiers)?;

    let sources = discovery::discover(
        task,
        seed,
        &firecrawl,
        &firecrawl,
        &classifier,
        cfg.corpus.limit,
        cfg.firecrawl.search_limit,
        cfg.firecrawl.map_limit,
    )
    .await?;

    if sources.is_empty() {
        println!("no sources found");
        return Ok(());
    }
    for source in &sources {
        println!(
            "{}  {}  {}",
            source.tier,
            source.url,
            source.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_search(
    cfg: &Config,
    query: &str,
    limit: Option<usize>,
) -> teach_harness::error::Result<()> {
    use teach_harness::providers::SearchProvider;

    let firecrawl = FirecrawlClient::new(&cfg.firecrawl, config::firecrawl_api_key()?)?;
    let limit = limit.unwrap_or(cfg.firecrawl.search_limit);
    let hits = firecrawl.search(query, limit).await?;

    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }

    let mut cached = format!("Query: {}\n", query);
    for hit in &hits {
        println!("{}  {}", hit.url, hit.title.as_deref().unwrap_or(""));
        cached.push_str(&format!(
            "\n## {}\n{}\n",
            hit.title.as_deref().unwrap_or("Untitled"),
            hit.url
        ));
        if let Some(snippet) = &hit.snippet {
            cached.push_str(&format!("\n{}\n", snippet));
        }
    }

    // Cache misses are not worth failing a successful search over.
    if let Err(e) = write_search_cache(&cached) {
        warn!(error = %e, "failed to cache search results");
    }
    Ok(())
}

fn write_search_cache(content: &str) -> std::io::Result<()> {
    let dir = PathBuf::from("cache");
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    std::fs::write(dir.join(format!("{}_search.md", stamp)), content)
}

fn show_corpus(dir: &PathBuf, page_url: Option<&str>) -> teach_harness::error::Result<()> {
    let store = CorpusStore::open(dir)?;

    if let Some(url) = page_url {
        let page = store.page(url)?;
        println!(
            "{}  {}  {} tok  {}",
            page.local_id,
            page.tier,
            page.token_estimate,
            page.title.as_deref().unwrap_or("")
        );
        println!("{}", page.source_url);
        println!();
        println!("{}", page.content);
        return Ok(());
    }

    let manifest = store.manifest();
    println!("task: {}", manifest.task);
    println!(
        "pages: {} fetched, {} entries, {} tokens",
        manifest.page_count(),
        manifest.entries.len(),
        manifest.total_tokens
    );
    println!();
    for entry in &manifest.entries {
        let status = match &entry.fetch {
            FetchStatus::Fetched => "ok".to_string(),
            FetchStatus::Failed { error } => format!("failed: {}", error),
        };
        println!(
            "{:>4}  {}  {:>7} tok  {}  [{}]",
            entry.local_id, entry.tier, entry.token_estimate, entry.url, status
        );
    }
    Ok(())
}
