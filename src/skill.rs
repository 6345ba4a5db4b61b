//! Skill rendering from a successful run.
//!
//! A confirmed run is distilled into a reusable skill: a `SKILL.md` with YAML
//! frontmatter and a workflow section, plus a `registry.json` entry mapping
//! the task to the skill. No summarization happens here; the trace is the
//! artifact.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::models::{AttemptOutcome, RunReport};

const REGISTRY_FILE: &str = "registry.json";

/// Slug used for the skill directory and frontmatter name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.truncate(64);
    slug.trim_matches('-').to_string()
}

fn yaml_escape(value: &str) -> String {
    if value.contains(':') || value.contains('#') || value.contains('"') || value.contains('\'') {
        Value::String(value.to_string()).to_string()
    } else {
        value.to_string()
    }
}

fn trace_summary(report: &RunReport) -> String {
    let mut lines = Vec::new();
    for record in &report.trace {
        let line = match &record.outcome {
            AttemptOutcome::Complete { summary } => {
                format!("- attempt {}: completed — {}", record.attempt_number, summary)
            }
            AttemptOutcome::Gap { query } => {
                format!("- attempt {}: gap — searched `{}`", record.attempt_number, query)
            }
            AttemptOutcome::ProtocolViolation { .. } => {
                format!("- attempt {}: unparseable response, re-prompted", record.attempt_number)
            }
        };
        lines.push(line);
    }
    lines.join("\n")
}

fn render_skill_md(name: &str, report: &RunReport, summary: &str) -> String {
    let task_one_line = report.task.replace('\n', " ");
    let description = format!("Reusable workflow for: {}", task_one_line.trim());

    let mut sections = vec![
        "---".to_string(),
        format!("name: {}", name),
        format!("description: {}", yaml_escape(&description)),
        "---".to_string(),
        String::new(),
        "# Overview".to_string(),
        String::new(),
        report.task.trim().to_string(),
        String::new(),
        "# Workflow".to_string(),
        String::new(),
        "1. Attempt the task directly using the documentation corpus.".to_string(),
        "2. Run the task's own tests or validation commands.".to_string(),
        "3. On failure, search the docs with the exact error text and retry.".to_string(),
    ];

    if !report.gaps_filled.is_empty() {
        sections.push(String::new());
        sections.push("# Gaps filled during the run".to_string());
        sections.push(String::new());
        for query in &report.gaps_filled {
            sections.push(format!("- `{}`", query));
        }
    }

    sections.push(String::new());
    sections.push("# Trace summary".to_string());
    sections.push(String::new());
    sections.push(summary.to_string());

    let mut out = sections.join("\n");
    out.push('\n');
    out
}

/// Write `SKILL.md` under `out_dir/<slug>/` and record it in the registry
/// next to the corpus. Fails if the run did not succeed.
pub fn write_skill(
    report: &RunReport,
    name: &str,
    out_dir: &Path,
    registry_dir: &Path,
) -> Result<PathBuf> {
    if !report.succeeded() {
        return Err(HarnessError::Config(
            "cannot render a skill from a run that did not succeed".into(),
        ));
    }

    let slug = slugify(name);
    if slug.is_empty() {
        return Err(HarnessError::Config(format!(
            "skill name '{}' is empty after slugification",
            name
        )));
    }

    let skill_dir = out_dir.join(&slug);
    std::fs::create_dir_all(&skill_dir).map_err(|e| {
        HarnessError::Config(format!("cannot create {}: {}", skill_dir.display(), e))
    })?;

    let summary = trace_summary(report);
    let skill_path = skill_dir.join("SKILL.md");
    std::fs::write(&skill_path, render_skill_md(&slug, report, &summary)).map_err(|e| {
        HarnessError::Config(format!("cannot write {}: {}", skill_path.display(), e))
    })?;

    update_registry(registry_dir, &report.task, &slug, &skill_dir)?;

    info!(skill = %slug, path = %skill_path.display(), "skill written");
    Ok(skill_dir)
}

/// Merge one entry into `registry.json`, preserving existing entries. A
/// corrupt registry is replaced rather than failing the run.
fn update_registry(registry_dir: &Path, task: &str, slug: &str, skill_dir: &Path) -> Result<()> {
    let path = registry_dir.join(REGISTRY_FILE);

    let mut registry: Map<String, Value> = match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => Map::new(),
    };

    let entries = registry
        .entry("entries".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = entries {
        map.insert(
            task.to_string(),
            json!({
                "skill": slug,
                "created_at": Utc::now().to_rfc3339(),
                "out_dir": skill_dir.display().to_string(),
            }),
        );
    }

    let json = serde_json::to_string_pretty(&registry)
        .map_err(|e| HarnessError::Config(format!("cannot serialize registry: {}", e)))?;
    std::fs::write(&path, json)
        .map_err(|e| HarnessError::Config(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptRecord, RunOutcome};

    fn successful_report() -> RunReport {
        RunReport {
            task: "integrate the websocket client".into(),
            outcome: RunOutcome::Succeeded {
                summary: "client integrated and tested".into(),
            },
            attempts: 2,
            gaps_filled: vec!["websocket reconnect backoff".into()],
            trace: vec![
                AttemptRecord {
                    attempt_number: 1,
                    corpus_snapshot_tokens: 100,
                    outcome: AttemptOutcome::Gap {
                        query: "websocket reconnect backoff".into(),
                    },
                    timestamp: Utc::now(),
                },
                AttemptRecord {
                    attempt_number: 2,
                    corpus_snapshot_tokens: 180,
                    outcome: AttemptOutcome::Complete {
                        summary: "client integrated and tested".into(),
                    },
                    timestamp: Utc::now(),
                },
            ],
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("WebSocket Client!"), "websocket-client");
        assert_eq!(slugify("  --already--sluggy--  "), "already-sluggy");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_write_skill_renders_frontmatter_and_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let report = successful_report();
        let dir = write_skill(&report, "WS Client", tmp.path(), tmp.path()).unwrap();

        let skill = std::fs::read_to_string(dir.join("SKILL.md")).unwrap();
        assert!(skill.starts_with("---\nname: ws-client\n"));
        assert!(skill.contains("integrate the websocket client"));
        assert!(skill.contains("attempt 1: gap"));
        assert!(skill.contains("attempt 2: completed"));
        assert!(skill.contains("websocket reconnect backoff"));
    }

    #[test]
    fn test_registry_accumulates_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = successful_report();
        write_skill(&report, "first", tmp.path(), tmp.path()).unwrap();
        report.task = "a second task".into();
        write_skill(&report, "second", tmp.path(), tmp.path()).unwrap();

        let registry: Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("registry.json")).unwrap(),
        )
        .unwrap();
        let entries = registry["entries"].as_object().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a second task"]["skill"], "second");
    }

    #[test]
    fn test_rejects_unsuccessful_run() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = successful_report();
        report.outcome = RunOutcome::Exhausted;
        assert!(write_skill(&report, "nope", tmp.path(), tmp.path()).is_err());
    }
}
