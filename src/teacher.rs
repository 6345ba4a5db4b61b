//! The teacher loop: a bounded attempt/gap-fill state machine.
//!
//! ```text
//!                ┌──────────────┐  Complete   ┌─────────────────────────┐
//!            ┌──▶│  Attempting  │────────────▶│ AwaitingCompletionCheck │
//!   gap,     │   └──────┬───────┘             └───────┬────────┬────────┘
//!   retry    │          │                    rejected │        │ confirmed
//!            └──────────┼────────────────────◀────────┘        ▼
//!                       │                                 ┌───────────┐
//!          budget spent │                                 │ Succeeded │
//!                       ▼                                 └───────────┘
//!                 ┌───────────┐        unparseable ×2   ┌───────┐
//!                 │ Exhausted │                  ──────▶│ Fatal │
//!                 └───────────┘                         └───────┘
//! ```
//!
//! Control flow is strictly sequential: each iteration is one blocking
//! round-trip through the agent, then either the validation gate or the gap
//! resolver. The corpus mutates only between attempts, so a page added
//! during resolution is visible to the next attempt only. Cancellation is
//! cooperative and checked at iteration boundaries.
//!
//! The protocol is narrow by design — two legitimate outcomes, parsed
//! strictly. The single automatic re-prompt after an unparseable response is
//! the only leniency in the loop; a second consecutive violation is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::{reprompt_instruction, system_prompt};
use crate::corpus::CorpusStore;
use crate::error::{HarnessError, Result};
use crate::gap;
use crate::models::{AttemptOutcome, AttemptRecord, RunOutcome, RunReport};
use crate::protocol::{self, ParsedOutcome};
use crate::providers::{Agent, FetchProvider, SearchProvider, ValidationGate, Verdict};
use crate::tier::TierClassifier;

const TRACE_FILE: &str = "trace.json";

/// Loop state, tracked for logging and invariant checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Attempting,
    AwaitingCompletionCheck,
}

/// Tunables for one run.
pub struct LoopOptions {
    pub max_attempts: u32,
    pub corpus_limit: usize,
    pub search_limit: usize,
}

pub struct TeacherLoop<'a> {
    agent: &'a dyn Agent,
    gate: &'a dyn ValidationGate,
    search: &'a dyn SearchProvider,
    fetcher: &'a dyn FetchProvider,
    classifier: &'a TierClassifier,
    options: LoopOptions,
    cancel: Arc<AtomicBool>,
}

impl<'a> TeacherLoop<'a> {
    pub fn new(
        agent: &'a dyn Agent,
        gate: &'a dyn ValidationGate,
        search: &'a dyn SearchProvider,
        fetcher: &'a dyn FetchProvider,
        classifier: &'a TierClassifier,
        options: LoopOptions,
    ) -> Self {
        Self {
            agent,
            gate,
            search,
            fetcher,
            classifier,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between iterations; setting it stops the run at the next
    /// state transition. In-flight external calls are not preempted.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the loop to a terminal state.
    ///
    /// The attempt trace is persisted to `trace.json` in the corpus
    /// directory whether the run ends in success, exhaustion, or a fatal
    /// error, so it is always available for audit and skill synthesis.
    pub async fn run(&self, task: &str, store: &mut CorpusStore) -> Result<RunReport> {
        let mut trace: Vec<AttemptRecord> = Vec::new();
        let mut gaps_filled: Vec<String> = Vec::new();

        let result = self.drive(task, store, &mut trace, &mut gaps_filled).await;

        if let Err(e) = persist_trace(store, task, &trace) {
            warn!(error = %e, "failed to persist attempt trace");
        }

        let outcome = result?;
        Ok(RunReport {
            task: task.to_string(),
            outcome,
            attempts: trace.len() as u32,
            gaps_filled,
            trace,
        })
    }

    async fn drive(
        &self,
        task: &str,
        store: &mut CorpusStore,
        trace: &mut Vec<AttemptRecord>,
        gaps_filled: &mut Vec<String>,
    ) -> Result<RunOutcome> {
        let max_attempts = self.options.max_attempts;
        let mut attempt: u32 = 1;
        // Gate rejection reason, folded into the next prompt. An execution
        // failure, not a knowledge gap: the agent already had the docs.
        let mut execution_feedback: Option<String> = None;
        let mut needs_reprompt = false;
        let mut last_was_violation = false;
        let mut state = LoopState::Attempting;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!(attempt, "run cancelled at iteration boundary");
                return Ok(RunOutcome::Cancelled);
            }

            debug!(attempt, ?state, "starting iteration");
            state = LoopState::Attempting;

            // The corpus snapshot is read once per iteration; pages added by
            // a later resolution are never visible retroactively.
            let corpus_context = store.load_context()?;
            let snapshot_tokens = store.total_tokens();

            let system = system_prompt(task, &corpus_context);
            let user = build_user_prompt(task, execution_feedback.as_deref(), needs_reprompt);
            needs_reprompt = false;

            let raw = self.agent.attempt(&system, &user).await?;

            match protocol::parse(&raw) {
                Ok(ParsedOutcome::Complete { summary }) => {
                    last_was_violation = false;
                    state = LoopState::AwaitingCompletionCheck;
                    debug!(attempt, ?state, "completion claimed, consulting gate");

                    trace.push(record(attempt, snapshot_tokens, AttemptOutcome::Complete {
                        summary: summary.clone(),
                    }));

                    // Security violations inside the gate propagate here and
                    // terminate the run; the record above is already in the
                    // trace.
                    let verdict = self.gate.validate(&summary, &raw).await?;

                    match verdict {
                        Verdict::Confirmed => {
                            info!(attempt, "completion confirmed");
                            return Ok(RunOutcome::Succeeded { summary });
                        }
                        Verdict::Rejected { reason } => {
                            warn!(attempt, %reason, "completion claim rejected");
                            if attempt >= max_attempts {
                                return Ok(RunOutcome::Exhausted);
                            }
                            attempt += 1;
                            execution_feedback = Some(reason);
                        }
                    }
                }
                Ok(ParsedOutcome::Gap { query }) => {
                    last_was_violation = false;
                    execution_feedback = None;
                    trace.push(record(attempt, snapshot_tokens, AttemptOutcome::Gap {
                        query: query.clone(),
                    }));

                    if attempt >= max_attempts {
                        info!(attempt, "attempt budget spent");
                        return Ok(RunOutcome::Exhausted);
                    }

                    // A single resolution failure is absorbed: the next
                    // attempt runs against the unchanged corpus.
                    match gap::resolve(
                        &query,
                        store,
                        self.search,
                        self.fetcher,
                        self.classifier,
                        self.options.corpus_limit,
                        self.options.search_limit,
                    )
                    .await
                    {
                        Ok(resolution) => {
                            if resolution.pages_added > 0 {
                                gaps_filled.push(query);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "gap resolution failed, retrying with unchanged corpus");
                        }
                    }
                    attempt += 1;
                }
                Err(violation) => {
                    warn!(attempt, %violation, "protocol violation");
                    trace.push(record(
                        attempt,
                        snapshot_tokens,
                        AttemptOutcome::ProtocolViolation {
                            raw_response: raw.clone(),
                        },
                    ));

                    // One automatic re-prompt, and only one: a second
                    // consecutive violation, or no remaining attempt budget,
                    // is fatal.
                    if last_was_violation || attempt >= max_attempts {
                        return Err(HarnessError::Protocol { raw });
                    }
                    last_was_violation = true;
                    needs_reprompt = true;
                    attempt += 1;
                }
            }
        }
    }
}

fn build_user_prompt(task: &str, execution_feedback: Option<&str>, reprompt: bool) -> String {
    let mut prompt = format!("Please complete this task: {}", task);
    if let Some(reason) = execution_feedback {
        prompt.push_str(&format!(
            "\n\nYour previous completion claim was rejected by validation: {}\n\
Fix the execution problem and try again; the documentation you have is sufficient.",
            reason
        ));
    }
    if reprompt {
        prompt.push_str("\n\n");
        prompt.push_str(&reprompt_instruction());
    }
    prompt
}

fn record(attempt_number: u32, corpus_snapshot_tokens: usize, outcome: AttemptOutcome) -> AttemptRecord {
    AttemptRecord {
        attempt_number,
        corpus_snapshot_tokens,
        outcome,
        timestamp: chrono::Utc::now(),
    }
}

fn persist_trace(store: &CorpusStore, task: &str, trace: &[AttemptRecord]) -> Result<()> {
    let payload = serde_json::json!({
        "task": task,
        "attempts": trace,
    });
    let path = store.dir().join(TRACE_FILE);
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| HarnessError::Config(format!("cannot serialize trace: {}", e)))?;
    std::fs::write(&path, json)
        .map_err(|e| HarnessError::Config(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(())
}
